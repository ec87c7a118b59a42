//! Incremental page loader for gallery-style feeds.
//!
//! The crate merges a local persistent cache with a paginated remote source:
//!
//! - **Fetching**: one outstanding HTTP request per feed, cancellable, with
//!   a typed error taxonomy ([`fetch`])
//! - **Caching**: durable per-feed state in SQLite — page count, item list,
//!   last-updated timestamp — mutated only inside transactions ([`storage`])
//! - **Orchestration**: an explicit state machine that decides when to fetch,
//!   folds results into the cache, and exposes a loading observable
//!   ([`controller`])
//! - **Load-more**: an edge-triggered proximity signal for scrollable
//!   surfaces ([`trigger`])
//!
//! Rendering, navigation and layout are out of scope; an embedding
//! application drives the controller from its own event loop and consumes
//! the cached item sequence for display.
//!
//! # Example
//!
//! ```ignore
//! use pagefeed::{Config, Database, FeedCache, FeedController, FeedKey, PageFetcher};
//!
//! let config = Config::default();
//! let db = Database::open(":memory:").await?;
//! let cache = FeedCache::new(db);
//! let fetcher = PageFetcher::new(&config)?;
//!
//! let mut controller = FeedController::new(cache, fetcher, FeedKey::new("funny", "hot"));
//! controller.activate().await?;          // fetches page 0 for a fresh feed
//! while let Some(outcome) = controller.poll_outcome().await {
//!     // merged pages are now visible via controller.items()
//! }
//! ```

pub mod config;
pub mod controller;
pub mod fetch;
pub mod storage;
pub mod trigger;

pub use config::{Config, ConfigError};
pub use controller::{FeedController, LoadError, PageOutcome};
pub use fetch::{FetchError, Page, PageFetcher, PendingFetch, RemoteItem};
pub use storage::{CacheEvent, Database, Feed, FeedCache, FeedKey, Item, StorageError};
pub use trigger::LoadMoreTrigger;
