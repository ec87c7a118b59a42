//! Remote page fetching for gallery feeds.
//!
//! One fetch retrieves one page of a feed, identified by topic, sort mode
//! and a zero-based page index:
//!
//! - [`PageFetcher`] builds the request (base URL, auth header, timeout)
//!   and decodes the JSON page payload
//! - [`PendingFetch`] wraps one outstanding request spawned onto the
//!   runtime; cancelling it suppresses the result entirely
//! - [`FetchError`] separates transport failures from protocol-level ones;
//!   a delivered page whose own `success` flag is false is *not* an error
//!   here — that determination belongs to the controller
//!
//! Response bodies are streamed with a hard size cap and checked against
//! Content-Length, so a hostile or truncated response never exhausts memory
//! or decodes as a partial page.

mod client;

pub use client::{FetchError, Page, PageFetcher, PendingFetch, RemoteItem};
