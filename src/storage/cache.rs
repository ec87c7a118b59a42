use tokio::sync::broadcast;

use crate::fetch::RemoteItem;

use super::schema::Database;
use super::types::{CacheEvent, Feed, FeedKey, Item, StorageError};

/// Capacity of the change-notification channel. Subscribers that fall more
/// than this far behind see a `Lagged` error instead of the missed events.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Durable feed cache with post-commit change notification.
///
/// Thin façade over [`Database`] that pairs every committed merge or reset
/// with a [`CacheEvent`] on a broadcast channel, so display surfaces can
/// react to new items without polling. Cloning is cheap: the pool and the
/// channel sender are both shared handles.
#[derive(Clone)]
pub struct FeedCache {
    db: Database,
    events: broadcast::Sender<CacheEvent>,
}

impl FeedCache {
    pub fn new(db: Database) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { db, events }
    }

    /// Subscribe to change notifications. Events are delivered after the
    /// corresponding transaction has committed, never before.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Look up a feed by key, creating an empty persisted row if absent.
    pub async fn get_or_create(&self, key: &FeedKey) -> Result<Feed, StorageError> {
        self.db.get_or_create_feed(&key.cache_key()).await
    }

    /// Fold one fetched page into a feed and notify subscribers.
    pub async fn merge(&self, feed_id: i64, items: &[RemoteItem]) -> Result<Feed, StorageError> {
        let feed = self.db.merge_page(feed_id, items).await?;
        // Send fails only when nobody is subscribed, which is fine.
        let _ = self.events.send(CacheEvent::Merged {
            feed_id,
            new_items: items.len(),
            pages_loaded: feed.pages_loaded,
        });
        Ok(feed)
    }

    /// Reset a feed to zero pages and notify subscribers.
    pub async fn reset(&self, feed_id: i64) -> Result<Feed, StorageError> {
        let feed = self.db.reset_feed(feed_id).await?;
        let _ = self.events.send(CacheEvent::Reset { feed_id });
        Ok(feed)
    }

    /// All items of a feed in arrival order.
    pub async fn items(&self, feed_id: i64) -> Result<Vec<Item>, StorageError> {
        self.db.get_items_for_feed(feed_id).await
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }
}
