use crate::config::Config;
use crate::storage::FeedKey;
use futures::StreamExt;
use reqwest::header;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

/// Errors that can occur while fetching a gallery page.
///
/// These cover the transport side of a fetch: network issues, HTTP errors,
/// oversized or truncated bodies, and payloads that are not a page at all.
/// A well-formed page with `success == false` is a *logical* failure and is
/// returned as a normal [`Page`] for the caller to judge.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body was not a decodable page payload
    #[error("Response could not be decoded: {0}")]
    Decode(String),
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// The gallery base URL cannot address pages
    #[error("Invalid gallery base URL: {0}")]
    InvalidBaseUrl(String),
    /// The request was cancelled before a result was delivered
    #[error("Request was cancelled")]
    Cancelled,
}

// ============================================================================
// Wire Types
// ============================================================================

/// One batch of items as returned by a single fetch call.
///
/// Transient: only `items` outlive the fetch, by being folded into a feed.
/// `success` is the upstream API's own verdict — a page can arrive over a
/// perfectly healthy connection and still be logically unsuccessful.
#[derive(Debug, Clone, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub status: u16,
    #[serde(default, rename = "data")]
    pub items: Vec<RemoteItem>,
}

/// One content record as delivered by the remote source.
///
/// `id` and `title` are the fields this crate works with; everything else
/// the source sends is preserved in `extra` and persisted verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ============================================================================
// Fetcher
// ============================================================================

/// Client for the remote paging API.
///
/// Cheap to clone: the HTTP client is a shared handle and the credential is
/// behind an `Arc`. A fetcher issues at most the requests it is asked for —
/// single-flight per feed is the controller's responsibility.
#[derive(Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    base_url: Url,
    client_id: Option<Arc<SecretString>>,
    timeout: Duration,
    max_body_bytes: usize,
}

impl PageFetcher {
    /// Build a fetcher from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::InvalidBaseUrl`] if the configured base URL
    /// does not parse or cannot carry path segments, and
    /// [`FetchError::Network`] if the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let base_url = Url::parse(&config.api_base_url)
            .map_err(|e| FetchError::InvalidBaseUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(FetchError::InvalidBaseUrl(config.api_base_url.clone()));
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("pagefeed/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            client_id: config
                .client_id
                .clone()
                .map(|id| Arc::new(SecretString::from(id))),
            timeout: config.request_timeout(),
            max_body_bytes: config.max_response_bytes,
        })
    }

    /// Fetch one page of a feed.
    ///
    /// A decoded page is returned regardless of its `success` flag; only
    /// transport- and protocol-level problems produce an error.
    pub async fn fetch_page(&self, key: &FeedKey, page_index: u32) -> Result<Page, FetchError> {
        let url = self.page_url(key, page_index)?;

        let mut request = self.client.get(url);
        if let Some(client_id) = &self.client_id {
            request = request.header(
                header::AUTHORIZATION,
                format!("Client-ID {}", client_id.expose_secret()),
            );
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = read_limited_bytes(response, self.max_body_bytes).await?;
        let page: Page =
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))?;

        tracing::debug!(
            feed = %key,
            page = page_index,
            items = page.items.len(),
            success = page.success,
            "gallery page fetched"
        );
        Ok(page)
    }

    /// Spawn a fetch onto the runtime and hand back its handle.
    ///
    /// The request runs to completion (or cancellation) independently of the
    /// caller; the result is delivered exactly once through
    /// [`PendingFetch::wait`].
    pub fn begin(&self, key: &FeedKey, page_index: u32) -> PendingFetch {
        let fetcher = self.clone();
        let key = key.clone();
        let (tx, rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let result = fetcher.fetch_page(&key, page_index).await;
            // The receiver may already be gone (controller deactivated);
            // the result is simply dropped then.
            let _ = tx.send(result);
        });

        PendingFetch {
            page_index,
            task,
            rx,
        }
    }

    fn page_url(&self, key: &FeedKey, page_index: u32) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        let page = page_index.to_string();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| FetchError::InvalidBaseUrl(self.base_url.to_string()))?;
            segments.pop_if_empty();
            segments.extend([
                "gallery",
                "r",
                key.topic.as_str(),
                key.sort.as_str(),
                page.as_str(),
            ]);
        }
        Ok(url)
    }
}

// ============================================================================
// Pending Request
// ============================================================================

/// One outstanding page request.
///
/// At most one exists per controller at any time. Dropping the handle
/// abandons the result without stopping the request; [`cancel`](Self::cancel)
/// additionally aborts the task so the remote call is torn down as far as
/// cooperatively possible.
pub struct PendingFetch {
    page_index: u32,
    task: JoinHandle<()>,
    rx: oneshot::Receiver<Result<Page, FetchError>>,
}

impl PendingFetch {
    /// Zero-based index of the page this request is for.
    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    /// Best-effort cancellation.
    ///
    /// If the request has not completed, the task is aborted and a pending
    /// or future [`wait`](Self::wait) resolves to [`FetchError::Cancelled`]
    /// — no result is ever delivered. If it already completed, or nothing
    /// is outstanding, this is a no-op.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Whether the underlying request task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Await the result of the request. Resolves exactly once.
    pub async fn wait(&mut self) -> Result<Page, FetchError> {
        match (&mut self.rx).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Cancelled),
        }
    }
}

// ============================================================================
// Body Reading
// ============================================================================

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Capture Content-Length for the completeness check below
    let expected_length = response.content_length();

    // Fast path: reject oversized bodies before reading anything
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    // A network interruption can end the stream short of Content-Length;
    // a short body must not decode as a (possibly valid) partial page.
    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
