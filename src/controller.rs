//! Orchestration of cache and fetcher for one visible feed.
//!
//! A [`FeedController`] is the single logical owner of its feed: it resolves
//! the durable row at activation, decides when a page fetch is warranted,
//! folds results into the cache, and exposes loading state to whatever
//! surface renders the items. The guard against duplicate concurrent
//! fetches is the controller's state itself — `Loading` carries the
//! in-flight request handle, so "loading with nothing outstanding" cannot
//! be represented.
//!
//! The controller is cooperative, not a lock: a second controller bound to
//! the same feed key would race at the store level. The design assumes one
//! active controller per feed at a time.

use thiserror::Error;
use tokio::sync::watch;

use crate::fetch::{FetchError, PageFetcher, PendingFetch};
use crate::storage::{Feed, FeedCache, FeedKey, Item, StorageError};

// ============================================================================
// Error and Outcome Types
// ============================================================================

/// Why a page load produced nothing.
///
/// Upstream failure (a delivered page with `success == false`) follows the
/// same control flow as a transport failure: no merge, back to idle, the
/// page index is not consumed. Storage failure means the page arrived but
/// could not be committed.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("upstream reported failure (status {status})")]
    Upstream { status: u16 },

    #[error("cache update failed: {0}")]
    Storage(#[from] StorageError),
}

/// Terminal result of one page load.
///
/// Whatever the variant, the controller is idle again and the loading
/// observable reads `false` by the time the outcome is returned.
#[derive(Debug)]
pub enum PageOutcome {
    /// The page was fetched and committed to the cache.
    Merged { page_index: u32, new_items: usize },
    /// The page was not merged; the same index will be retried on the next
    /// load-more signal. Failures are not remembered — no backoff, no retry
    /// cap.
    Failed { page_index: u32, error: LoadError },
    /// The result arrived after a `clear()` fenced it off and was dropped.
    Discarded { page_index: u32 },
}

// ============================================================================
// State Machine
// ============================================================================

struct InFlight {
    request: PendingFetch,
    /// Generation at the time the fetch was issued; compared against the
    /// controller's current generation before merging (see [`FeedController::clear`]).
    generation: u64,
}

enum State {
    Idle,
    Loading(InFlight),
}

/// Paging state machine for one feed.
///
/// Typical driving loop:
///
/// ```ignore
/// controller.activate().await?;                 // fetches page 0 if the feed is fresh
/// loop {
///     tokio::select! {
///         Some(outcome) = controller.poll_outcome() => { /* redraw from controller.items() */ }
///         pos = viewport_positions.recv() => {
///             if trigger.observe(pos.last_visible, pos.total) {
///                 controller.on_load_more_requested();
///             }
///         }
///     }
/// }
/// ```
pub struct FeedController {
    cache: FeedCache,
    fetcher: PageFetcher,
    key: FeedKey,
    feed: Option<Feed>,
    state: State,
    /// Bumped by `clear()` to fence off merges from fetches issued before
    /// the reset.
    generation: u64,
    loading: watch::Sender<bool>,
}

impl FeedController {
    pub fn new(cache: FeedCache, fetcher: PageFetcher, key: FeedKey) -> Self {
        let (loading, _) = watch::channel(false);
        Self {
            cache,
            fetcher,
            key,
            feed: None,
            state: State::Idle,
            generation: 0,
            loading,
        }
    }

    /// Resolve the feed and, if it has no pages yet, start loading page 0.
    ///
    /// A feed that already has cached pages is exposed as-is: no
    /// revalidation against the remote source, staleness is accepted.
    /// Calling activate while a fetch is in flight leaves that fetch alone.
    pub async fn activate(&mut self) -> Result<Feed, StorageError> {
        let feed = self.cache.get_or_create(&self.key).await?;
        tracing::debug!(feed = %self.key, pages = feed.pages_loaded, "controller activated");

        let fresh = feed.pages_loaded == 0;
        self.feed = Some(feed.clone());

        if fresh && !self.is_loading() {
            self.start_fetch(0);
        }
        Ok(feed)
    }

    /// Load-more signal from the scroll surface.
    ///
    /// No-op while a fetch is in flight — any number of calls during
    /// `Loading` leave exactly one outstanding request. Otherwise issues a
    /// fetch for the next unloaded page.
    pub fn on_load_more_requested(&mut self) {
        if self.is_loading() {
            tracing::trace!(feed = %self.key, "load-more ignored, fetch already in flight");
            return;
        }
        let Some(feed) = &self.feed else {
            tracing::warn!(feed = %self.key, "load-more before activation ignored");
            return;
        };
        self.start_fetch(feed.next_page_index());
    }

    /// Await the in-flight fetch and apply its result.
    ///
    /// Returns `None` when nothing is outstanding. Cancellation-safe while
    /// waiting for the network: dropping the returned future leaves the
    /// controller `Loading` and a later call resumes the same request.
    pub async fn poll_outcome(&mut self) -> Option<PageOutcome> {
        let (result, page_index, issued_generation) = match &mut self.state {
            State::Idle => return None,
            State::Loading(inflight) => {
                let result = inflight.request.wait().await;
                (
                    result,
                    inflight.request.page_index(),
                    inflight.generation,
                )
            }
        };

        self.state = State::Idle;
        self.loading.send_replace(false);

        if issued_generation != self.generation {
            tracing::debug!(feed = %self.key, page = page_index, "stale result discarded after reset");
            return Some(PageOutcome::Discarded { page_index });
        }

        let outcome = match result {
            Ok(page) if page.success => {
                let Some(feed) = &self.feed else {
                    return Some(PageOutcome::Discarded { page_index });
                };
                match self.cache.merge(feed.id, &page.items).await {
                    Ok(updated) => {
                        tracing::info!(
                            feed = %self.key,
                            page = page_index,
                            items = page.items.len(),
                            pages_loaded = updated.pages_loaded,
                            "page merged"
                        );
                        let new_items = page.items.len();
                        self.feed = Some(updated);
                        PageOutcome::Merged {
                            page_index,
                            new_items,
                        }
                    }
                    Err(e) => {
                        tracing::error!(feed = %self.key, page = page_index, error = %e, "page merge failed");
                        PageOutcome::Failed {
                            page_index,
                            error: LoadError::Storage(e),
                        }
                    }
                }
            }
            Ok(page) => {
                tracing::warn!(
                    feed = %self.key,
                    page = page_index,
                    status = page.status,
                    "upstream reported failure, page not merged"
                );
                PageOutcome::Failed {
                    page_index,
                    error: LoadError::Upstream {
                        status: page.status,
                    },
                }
            }
            Err(e) => {
                tracing::warn!(feed = %self.key, page = page_index, error = %e, "page fetch failed");
                PageOutcome::Failed {
                    page_index,
                    error: LoadError::Fetch(e),
                }
            }
        };

        Some(outcome)
    }

    /// Cancel any outstanding fetch and clear the loading indicator.
    ///
    /// A result that was already in flight is suppressed, never merged.
    /// The cached feed state itself is untouched; a later [`activate`](Self::activate)
    /// picks it back up.
    pub fn deactivate(&mut self) {
        if let State::Loading(inflight) = std::mem::replace(&mut self.state, State::Idle) {
            inflight.request.cancel();
            tracing::debug!(feed = %self.key, "outstanding page fetch cancelled");
        }
        self.loading.send_replace(false);
    }

    /// Reset the feed to zero pages.
    ///
    /// Does not cancel an outstanding fetch; instead the generation counter
    /// fences it off, so a fetch issued before the reset resolves as
    /// [`PageOutcome::Discarded`] rather than re-populating the feed.
    /// Callers that want the request gone as well should
    /// [`deactivate`](Self::deactivate) first.
    pub async fn clear(&mut self) -> Result<(), StorageError> {
        let Some(feed) = &self.feed else {
            return Ok(());
        };
        self.generation += 1;
        let feed = self.cache.reset(feed.id).await?;
        tracing::info!(feed = %self.key, "feed reset");
        self.feed = Some(feed);
        Ok(())
    }

    /// The cached item sequence for display, in arrival order.
    pub async fn items(&self) -> Result<Vec<Item>, StorageError> {
        match &self.feed {
            Some(feed) => self.cache.items(feed.id).await,
            None => Ok(Vec::new()),
        }
    }

    /// Durable state of the feed as of the last cache interaction.
    pub fn feed(&self) -> Option<&Feed> {
        self.feed.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, State::Loading(_))
    }

    /// Observable loading indicator for the rendering surface. Reads `true`
    /// from fetch start until any terminal outcome.
    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    fn start_fetch(&mut self, page_index: u32) {
        let request = self.fetcher.begin(&self.key, page_index);
        self.state = State::Loading(InFlight {
            request,
            generation: self.generation,
        });
        self.loading.send_replace(true);
        tracing::debug!(feed = %self.key, page = page_index, "page fetch started");
    }
}

/// An outstanding fetch must not outlive the controller that issued it.
impl Drop for FeedController {
    fn drop(&mut self) {
        if let State::Loading(inflight) = &self.state {
            inflight.request.cancel();
        }
    }
}
