use crate::fetch::RemoteItem;

use super::schema::Database;
use super::types::{Feed, FeedRow, Item, ItemRow, StorageError};

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Look up a feed by its cache key, creating an empty row if absent.
    ///
    /// Idempotent under concurrent calls with the same key: the insert is
    /// `ON CONFLICT DO NOTHING`, so duplicate-create attempts resolve to the
    /// existing row and at most one feed per key ever exists. Both the
    /// insert and the read-back happen inside one transaction so the caller
    /// always receives the persisted row.
    pub async fn get_or_create_feed(&self, key: &str) -> Result<Feed, StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO feeds (key) VALUES (?) ON CONFLICT(key) DO NOTHING")
            .bind(key)
            .execute(&mut *tx)
            .await?;

        let row: FeedRow = sqlx::query_as(
            "SELECT id, key, pages_loaded, last_updated FROM feeds WHERE key = ?",
        )
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into_feed())
    }

    /// Fetch a feed row by id.
    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, StorageError> {
        let row: Option<FeedRow> = sqlx::query_as(
            "SELECT id, key, pages_loaded, last_updated FROM feeds WHERE id = ?",
        )
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedRow::into_feed))
    }

    /// Fold one fetched page into a feed.
    ///
    /// Inside a single transaction: appends the items after the current
    /// highest position, bumps `pages_loaded` by exactly one, and stamps
    /// `last_updated`. If the transaction cannot be opened or committed the
    /// error surfaces to the caller and no partial mutation becomes visible.
    ///
    /// Returns the updated feed row. An empty page still counts as loaded —
    /// the page counter advances even when no items arrive.
    pub async fn merge_page(
        &self,
        feed_id: i64,
        items: &[RemoteItem],
    ) -> Result<Feed, StorageError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let (next_position,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(position) + 1, 0) FROM items WHERE feed_id = ?")
                .bind(feed_id)
                .fetch_one(&mut *tx)
                .await?;

        for (offset, item) in items.iter().enumerate() {
            let payload = serde_json::to_string(&item.extra)?;
            sqlx::query(
                r#"
                INSERT INTO items (feed_id, remote_id, title, link, payload, position)
                VALUES (?, ?, ?, ?, ?, ?)
            "#,
            )
            .bind(feed_id)
            .bind(&item.id)
            .bind(&item.title)
            .bind(&item.link)
            .bind(payload)
            .bind(next_position + offset as i64)
            .execute(&mut *tx)
            .await?;
        }

        let row: FeedRow = sqlx::query_as(
            r#"
            UPDATE feeds SET pages_loaded = pages_loaded + 1, last_updated = ?
            WHERE id = ?
            RETURNING id, key, pages_loaded, last_updated
        "#,
        )
        .bind(now)
        .bind(feed_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into_feed())
    }

    /// Reset a feed to zero pages, deleting all its items.
    ///
    /// The feed identity persists; only the accumulated state is cleared.
    /// Runs inside one transaction so readers never observe a half-reset
    /// feed.
    pub async fn reset_feed(&self, feed_id: i64) -> Result<Feed, StorageError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM items WHERE feed_id = ?")
            .bind(feed_id)
            .execute(&mut *tx)
            .await?;

        let row: FeedRow = sqlx::query_as(
            r#"
            UPDATE feeds SET pages_loaded = 0
            WHERE id = ?
            RETURNING id, key, pages_loaded, last_updated
        "#,
        )
        .bind(feed_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into_feed())
    }

    // ========================================================================
    // Item Operations
    // ========================================================================

    /// All items of a feed in arrival order.
    pub async fn get_items_for_feed(&self, feed_id: i64) -> Result<Vec<Item>, StorageError> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT id, feed_id, remote_id, title, link, payload, position
            FROM items
            WHERE feed_id = ?
            ORDER BY position
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ItemRow::into_item).collect())
    }

    /// Number of items currently cached for a feed.
    pub async fn count_items_for_feed(&self, feed_id: i64) -> Result<i64, StorageError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items WHERE feed_id = ?")
            .bind(feed_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
