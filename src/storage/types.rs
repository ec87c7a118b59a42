use std::fmt;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum StorageError {
    /// Another process has the cache database locked
    #[error("The feed cache is locked by another process. Please close it and try again.")]
    CacheLocked,

    /// Migration failed
    #[error("Cache migration failed: {0}")]
    Migration(String),

    /// Item payload could not be encoded for persistence
    #[error("Item payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    /// Generic database error
    #[error("Cache error: {0}")]
    Other(#[from] sqlx::Error),
}

impl StorageError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StorageError::CacheLocked;
        }

        StorageError::Other(err)
    }
}

// ============================================================================
// Feed Identity
// ============================================================================

/// Identity of one remote feed: a topic paired with a sort mode.
///
/// The composite cache key derived from the pair is what the durable
/// [`Feed`] row is looked up by; two controllers built from an equal
/// `FeedKey` resolve to the same persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedKey {
    pub topic: String,
    pub sort: String,
}

impl FeedKey {
    pub fn new(topic: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            sort: sort.into(),
        }
    }

    /// Composite key the cache row is stored under.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.topic, self.sort)
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.sort)
    }
}

// ============================================================================
// Helper Types
// ============================================================================

/// Row type for feed queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedRow {
    pub id: i64,
    pub key: String,
    pub pages_loaded: i64,
    pub last_updated: Option<i64>,
}

impl FeedRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            key: self.key,
            pages_loaded: self.pages_loaded,
            last_updated: self.last_updated,
        }
    }
}

/// Internal row type for item queries.
/// Converts to Item via into_item() with Arc wrapping for the title.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub id: i64,
    pub feed_id: i64,
    pub remote_id: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub payload: String,
    pub position: i64,
}

impl ItemRow {
    pub(crate) fn into_item(self) -> Item {
        Item {
            id: self.id,
            feed_id: self.feed_id,
            remote_id: self.remote_id,
            title: self.title.map(Arc::from),
            link: self.link,
            payload: self.payload,
            position: self.position,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Durable per-feed state from the cache database.
///
/// `pages_loaded` goes up by exactly one per successful merge and returns
/// to zero only through an explicit reset; the row itself is never deleted.
#[derive(Debug, Clone)]
pub struct Feed {
    pub id: i64,
    pub key: String,
    pub pages_loaded: i64,
    /// Unix timestamp of the last successful merge, if any.
    pub last_updated: Option<i64>,
}

impl Feed {
    /// Zero-based index of the next page to request.
    pub fn next_page_index(&self) -> u32 {
        self.pages_loaded.max(0) as u32
    }
}

/// One cached content record, owned by its feed.
///
/// `position` preserves arrival order across merges. `payload` carries the
/// remote source's extra fields as raw JSON; consumers that need them decode
/// on demand. `title` uses `Arc<str>` for cheap cloning into display layers.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: i64,
    pub feed_id: i64,
    pub remote_id: String,
    pub title: Option<Arc<str>>,
    pub link: Option<String>,
    /// Raw JSON object with the remaining remote-provided fields.
    pub payload: String,
    pub position: i64,
}

// ============================================================================
// Change Notification
// ============================================================================

/// In-process notification emitted after a cache transaction commits.
///
/// At-least-once within the process; a lagging subscriber may miss events
/// and observe a `Lagged` error from the broadcast channel instead. This is
/// not a durable event log.
#[derive(Debug, Clone)]
pub enum CacheEvent {
    /// A page was folded into a feed.
    Merged {
        feed_id: i64,
        new_items: usize,
        pages_loaded: i64,
    },
    /// A feed was reset to zero pages.
    Reset { feed_id: i64 },
}
