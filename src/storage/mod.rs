mod cache;
mod feeds;
mod schema;
mod types;

pub use cache::FeedCache;
pub use schema::Database;
pub use types::{CacheEvent, Feed, FeedKey, Item, StorageError};
