//! End-to-end controller scenarios against a mock gallery API and an
//! in-memory cache: activation, load-more, failure handling, cancellation,
//! and the reset-while-loading fence.

use std::time::Duration;

use pagefeed::{
    Config, Database, FeedCache, FeedController, FeedKey, FetchError, LoadError, PageFetcher,
    PageOutcome, RemoteItem,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn page_body(ids: &[&str], success: bool) -> String {
    let items: Vec<serde_json::Value> = ids
        .iter()
        .map(|id| serde_json::json!({ "id": id, "title": id.to_uppercase() }))
        .collect();
    serde_json::json!({
        "data": items,
        "success": success,
        "status": if success { 200 } else { 500 },
    })
    .to_string()
}

fn remote_item(id: &str) -> RemoteItem {
    RemoteItem {
        id: id.to_string(),
        title: Some(id.to_uppercase()),
        link: None,
        extra: serde_json::Map::new(),
    }
}

async fn setup(server: &MockServer) -> (FeedCache, PageFetcher) {
    let db = Database::open(":memory:").await.unwrap();
    let cache = FeedCache::new(db);
    let config = Config {
        api_base_url: server.uri(),
        ..Config::default()
    };
    let fetcher = PageFetcher::new(&config).unwrap();
    (cache, fetcher)
}

// ============================================================================
// Activation
// ============================================================================

#[tokio::test]
async fn test_activation_of_fresh_feed_loads_first_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gallery/r/funny/hot/0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_body(&["a", "b", "c"], true)))
        .expect(1)
        .mount(&server)
        .await;

    let (cache, fetcher) = setup(&server).await;
    let mut controller = FeedController::new(cache, fetcher, FeedKey::new("funny", "hot"));

    let feed = controller.activate().await.unwrap();
    assert_eq!(feed.pages_loaded, 0);
    assert!(controller.is_loading());

    match controller.poll_outcome().await {
        Some(PageOutcome::Merged {
            page_index: 0,
            new_items: 3,
        }) => {}
        other => panic!("Expected Merged page 0, got {:?}", other),
    }

    assert!(!controller.is_loading());
    let feed = controller.feed().unwrap();
    assert_eq!(feed.pages_loaded, 1);

    let items = controller.items().await.unwrap();
    let ids: Vec<&str> = items.iter().map(|i| i.remote_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_activation_with_cached_pages_stays_idle() {
    let server = MockServer::start().await;
    // No request may reach the network for an already-populated feed
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_body(&["x"], true)))
        .expect(0)
        .mount(&server)
        .await;

    let (cache, fetcher) = setup(&server).await;
    let key = FeedKey::new("funny", "hot");
    let feed = cache.get_or_create(&key).await.unwrap();
    cache
        .merge(feed.id, &[remote_item("a"), remote_item("b")])
        .await
        .unwrap();

    let mut controller = FeedController::new(cache, fetcher, key);
    let feed = controller.activate().await.unwrap();

    // Cached items are exposed as-is; staleness is accepted
    assert_eq!(feed.pages_loaded, 1);
    assert!(!controller.is_loading());
    assert_eq!(controller.items().await.unwrap().len(), 2);
    assert!(controller.poll_outcome().await.is_none());
}

// ============================================================================
// Load-More and Failures
// ============================================================================

#[tokio::test]
async fn test_upstream_failure_leaves_feed_unchanged_and_retries_same_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gallery/r/funny/hot/0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_body(&["a", "b", "c"], true)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gallery/r/funny/hot/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_body(&[], false)))
        .expect(2)
        .mount(&server)
        .await;

    let (cache, fetcher) = setup(&server).await;
    let mut controller = FeedController::new(cache, fetcher, FeedKey::new("funny", "hot"));

    controller.activate().await.unwrap();
    assert!(matches!(
        controller.poll_outcome().await,
        Some(PageOutcome::Merged { page_index: 0, .. })
    ));

    // Page 1 is delivered but logically unsuccessful: no merge
    controller.on_load_more_requested();
    match controller.poll_outcome().await {
        Some(PageOutcome::Failed {
            page_index: 1,
            error: LoadError::Upstream { status: 500 },
        }) => {}
        other => panic!("Expected upstream failure for page 1, got {:?}", other),
    }

    let feed = controller.feed().unwrap();
    assert_eq!(feed.pages_loaded, 1);
    assert_eq!(controller.items().await.unwrap().len(), 3);
    assert!(!controller.is_loading());

    // Nothing recorded the failure: the next trigger attempts page 1 again
    controller.on_load_more_requested();
    assert!(matches!(
        controller.poll_outcome().await,
        Some(PageOutcome::Failed { page_index: 1, .. })
    ));
}

#[tokio::test]
async fn test_transport_failure_behaves_like_upstream_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gallery/r/funny/hot/0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_body(&["a"], true)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gallery/r/funny/hot/1"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let (cache, fetcher) = setup(&server).await;
    let mut controller = FeedController::new(cache, fetcher, FeedKey::new("funny", "hot"));

    controller.activate().await.unwrap();
    controller.poll_outcome().await;

    controller.on_load_more_requested();
    match controller.poll_outcome().await {
        Some(PageOutcome::Failed {
            page_index: 1,
            error: LoadError::Fetch(FetchError::HttpStatus(502)),
        }) => {}
        other => panic!("Expected transport failure for page 1, got {:?}", other),
    }

    let feed = controller.feed().unwrap();
    assert_eq!(feed.pages_loaded, 1);
    assert_eq!(controller.items().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_duplicate_load_more_keeps_single_outstanding_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gallery/r/funny/hot/0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(page_body(&["a"], true))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (cache, fetcher) = setup(&server).await;
    let mut controller = FeedController::new(cache, fetcher, FeedKey::new("funny", "hot"));

    controller.activate().await.unwrap();
    assert!(controller.is_loading());

    // A storm of signals while loading must not spawn more requests
    for _ in 0..5 {
        controller.on_load_more_requested();
    }

    assert!(matches!(
        controller.poll_outcome().await,
        Some(PageOutcome::Merged { page_index: 0, .. })
    ));
    // The mock's expect(1) verifies on drop that exactly one request landed
}

// ============================================================================
// Cancellation and Reset
// ============================================================================

#[tokio::test]
async fn test_deactivate_cancels_and_discards_in_flight_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gallery/r/funny/hot/0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(page_body(&["a", "b"], true))
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;

    let (cache, fetcher) = setup(&server).await;
    let mut controller = FeedController::new(cache.clone(), fetcher, FeedKey::new("funny", "hot"));

    controller.activate().await.unwrap();
    assert!(controller.is_loading());

    controller.deactivate();
    assert!(!controller.is_loading());
    assert!(controller.poll_outcome().await.is_none());

    // Even after the response would have arrived, nothing was merged
    tokio::time::sleep(Duration::from_millis(300)).await;
    let feed = cache
        .get_or_create(&FeedKey::new("funny", "hot"))
        .await
        .unwrap();
    assert_eq!(feed.pages_loaded, 0);
    assert!(cache.items(feed.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_clear_resets_feed_and_next_activation_starts_fresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gallery/r/funny/hot/0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_body(&["n"], true)))
        .expect(1)
        .mount(&server)
        .await;

    let (cache, fetcher) = setup(&server).await;
    let key = FeedKey::new("funny", "hot");

    // Populate five pages directly through the cache
    let feed = cache.get_or_create(&key).await.unwrap();
    for page in 0..5 {
        let items: Vec<RemoteItem> = (0..8)
            .map(|n| remote_item(&format!("p{}i{}", page, n)))
            .collect();
        cache.merge(feed.id, &items).await.unwrap();
    }

    let mut controller = FeedController::new(cache, fetcher, key);
    let feed = controller.activate().await.unwrap();
    assert_eq!(feed.pages_loaded, 5);
    assert!(!controller.is_loading());

    controller.clear().await.unwrap();
    let feed = controller.feed().unwrap();
    assert_eq!(feed.pages_loaded, 0);
    assert!(controller.items().await.unwrap().is_empty());

    // Re-activation sees a fresh feed and fetches page 0 again
    controller.deactivate();
    controller.activate().await.unwrap();
    assert!(matches!(
        controller.poll_outcome().await,
        Some(PageOutcome::Merged { page_index: 0, .. })
    ));
    assert_eq!(controller.feed().unwrap().pages_loaded, 1);
}

#[tokio::test]
async fn test_clear_while_loading_fences_off_the_stale_merge() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gallery/r/funny/hot/0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(page_body(&["stale"], true))
                .set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;

    let (cache, fetcher) = setup(&server).await;
    let mut controller = FeedController::new(cache, fetcher, FeedKey::new("funny", "hot"));

    controller.activate().await.unwrap();
    assert!(controller.is_loading());

    // Reset while the fetch is still in flight
    controller.clear().await.unwrap();

    match controller.poll_outcome().await {
        Some(PageOutcome::Discarded { page_index: 0 }) => {}
        other => panic!("Expected Discarded, got {:?}", other),
    }

    // The stale page never re-populated the feed
    let feed = controller.feed().unwrap();
    assert_eq!(feed.pages_loaded, 0);
    assert!(controller.items().await.unwrap().is_empty());
    assert!(!controller.is_loading());
}

// ============================================================================
// Loading Observable
// ============================================================================

#[tokio::test]
async fn test_loading_indicator_tracks_fetch_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gallery/r/funny/hot/0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page_body(&["a"], true)))
        .mount(&server)
        .await;

    let (cache, fetcher) = setup(&server).await;
    let mut controller = FeedController::new(cache, fetcher, FeedKey::new("funny", "hot"));
    let loading = controller.subscribe_loading();

    assert!(!*loading.borrow());

    controller.activate().await.unwrap();
    assert!(*loading.borrow());

    controller.poll_outcome().await;
    assert!(!*loading.borrow());
}

#[tokio::test]
async fn test_loading_indicator_clears_on_failure_too() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (cache, fetcher) = setup(&server).await;
    let mut controller = FeedController::new(cache, fetcher, FeedKey::new("funny", "hot"));
    let loading = controller.subscribe_loading();

    controller.activate().await.unwrap();
    assert!(*loading.borrow());

    assert!(matches!(
        controller.poll_outcome().await,
        Some(PageOutcome::Failed { .. })
    ));
    assert!(!*loading.borrow());
}
