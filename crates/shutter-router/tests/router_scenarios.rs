//! End-to-end routing decisions over in-memory tiers.

use async_trait::async_trait;
use http::header::{ACCEPT, COOKIE, USER_AGENT};
use http::{HeaderMap, HeaderValue, StatusCode};
use jiff::{SignedDuration, Timestamp};
use shutter_cache::MokaMappingCache;
use shutter_core::{
    CacheLookup, Identifier, ImageMapping, MappingCache, ReadRepository, Repository, StorageError,
};
use shutter_router::{
    AccessEvent, AccessPolicy, AccessType, ClientType, ImageRouter, ProxyConfig, ProxyFetcher,
    ResourceResolver, RouterConfig, ServeMode, Served, StatsError, StatsRecorder, StatsSink,
    VerificationSigner,
};
use shutter_storage::InMemoryRepository;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

const ID: &str = "Ab12Cd3xyz9";
const SECRET: &[u8] = b"router-test-secret";

#[derive(Default)]
struct RecordingSink(Mutex<Vec<AccessEvent>>);

impl RecordingSink {
    fn events(&self) -> Vec<AccessEvent> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatsSink for RecordingSink {
    async fn record(&self, event: &AccessEvent) -> Result<(), StatsError> {
        self.0.lock().unwrap().push(event.clone());
        Ok(())
    }
}

struct Harness {
    router: ImageRouter,
    cache: Arc<MokaMappingCache>,
    sink: Arc<RecordingSink>,
}

fn mapping(url: &str) -> ImageMapping {
    ImageMapping {
        id: Identifier::new_unchecked(ID),
        url: url.to_string(),
        filename: "holiday.png".to_string(),
        extension: Some("png".to_string()),
        created_at: Timestamp::now(),
        expires_at: None,
        password: None,
        short_url: format!("https://img.example/{ID}"),
    }
}

struct UnavailableStore;

#[async_trait]
impl ReadRepository for UnavailableStore {
    async fn get(&self, _id: &Identifier) -> Result<Option<ImageMapping>, StorageError> {
        Err(StorageError::Unavailable("connection refused".to_string()))
    }

    async fn exists(&self, _id: &Identifier) -> Result<bool, StorageError> {
        Err(StorageError::Unavailable("connection refused".to_string()))
    }
}

async fn harness(mode: ServeMode, mappings: Vec<ImageMapping>) -> Harness {
    let repo = InMemoryRepository::new();
    for m in mappings {
        repo.insert(m).await.unwrap();
    }
    harness_with_store(mode, Arc::new(repo))
}

fn harness_with_store(mode: ServeMode, store: Arc<dyn ReadRepository>) -> Harness {
    let cache = Arc::new(MokaMappingCache::new());
    let sink = Arc::new(RecordingSink::default());
    let proxy = ProxyFetcher::new(
        ProxyConfig::builder()
            .max_retries(0)
            .attempt_timeout(Duration::from_secs(2))
            .build(),
    )
    .unwrap();

    let router = ImageRouter::new(
        cache.clone(),
        ResourceResolver::new(store),
        AccessPolicy::new(Some(VerificationSigner::new(SECRET))),
        proxy,
        StatsRecorder::new(sink.clone()),
        RouterConfig::builder().serve_mode(mode).build(),
    );

    Harness {
        router,
        cache,
        sink,
    }
}

fn headers(pairs: &[(http::header::HeaderName, &'static str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
        map.insert(name.clone(), HeaderValue::from_static(value));
    }
    map
}

fn location(served: &Served) -> &str {
    match served {
        Served::Redirect { location, .. } => location,
        other => panic!("expected redirect, got {other:?}"),
    }
}

/// Stats are recorded on a detached task; blocks a worker until they land.
fn wait_for_events(sink: &RecordingSink, count: usize) {
    awaitility::at_most(Duration::from_secs(2))
        .poll_interval(Duration::from_millis(10))
        .until(|| sink.events().len() >= count);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn image_accept_without_extension_serves_origin() {
    let h = harness(ServeMode::Redirect, vec![mapping("https://origin.example/a.png")]).await;

    let served = h.router.handle(ID, &headers(&[(ACCEPT, "image/jpeg")])).await;

    assert_eq!(served.status(), StatusCode::FOUND);
    assert_eq!(location(&served), "https://origin.example/a.png");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn browser_with_extension_goes_to_preview() {
    let h = harness(ServeMode::Redirect, vec![mapping("https://origin.example/a.png")]).await;

    let served = h
        .router
        .handle("Ab12Cd3xyz9.png", &headers(&[(ACCEPT, "text/html")]))
        .await;

    assert_eq!(served.status(), StatusCode::FOUND);
    assert_eq!(location(&served), "/Ab12Cd3xyz9/p");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_identifier_redirects_to_raw_path() {
    let h = harness(ServeMode::Redirect, vec![]).await;

    let served = h.router.handle("Zz99yy88xx.jpg", &HeaderMap::new()).await;

    assert_eq!(location(&served), "/Zz99yy88xx.jpg");
    wait_for_events(&h.sink, 1);
    assert_eq!(h.sink.events()[0].access_type, AccessType::NotFound);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_identifier_redirects_without_stats() {
    let h = harness(ServeMode::Redirect, vec![]).await;

    let served = h.router.handle("a!", &HeaderMap::new()).await;

    assert_eq!(location(&served), "/a!");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(h.sink.events().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expired_mapping_is_gone() {
    let yesterday = Timestamp::now() - SignedDuration::from_hours(24);
    let mut m = mapping("https://origin.example/a.png");
    m.expires_at = Some(yesterday);
    let h = harness(ServeMode::Redirect, vec![m]).await;

    let served = h.router.handle(ID, &headers(&[(ACCEPT, "image/png")])).await;

    let Served::Json { status, body } = served else {
        panic!("expected JSON error body");
    };
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "expired");
    assert_eq!(body["expiresAt"], serde_json::to_value(yesterday).unwrap());
    assert!(h.cache.get(&Identifier::new_unchecked(ID)).await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cached_expired_mapping_is_gone_while_store_is_down() {
    let yesterday = Timestamp::now() - SignedDuration::from_hours(24);
    let mut m = mapping("https://origin.example/a.png");
    m.expires_at = Some(yesterday);
    let h = harness_with_store(ServeMode::Redirect, Arc::new(UnavailableStore));
    let id = Identifier::new_unchecked(ID);
    h.cache.set(&id, &m, Some(Duration::from_secs(3600))).await;
    assert!(h.cache.contains_raw(&id));

    let served = h.router.handle(ID, &headers(&[(ACCEPT, "image/png")])).await;

    assert_eq!(served.status(), StatusCode::GONE);
    assert!(matches!(served, Served::Json { .. }));
    assert!(!h.cache.contains_raw(&id));
    wait_for_events(&h.sink, 1);
    assert_eq!(h.sink.events()[0].access_type, AccessType::Expired);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expiry_outranks_preview_for_cached_browser_visit() {
    let mut m = mapping("https://origin.example/a.png");
    m.expires_at = Some(Timestamp::now() - SignedDuration::from_secs(1));
    m.password = Some("pbkdf2$hash".to_string());
    let h = harness_with_store(ServeMode::Redirect, Arc::new(UnavailableStore));
    let id = Identifier::new_unchecked(ID);
    h.cache.set(&id, &m, None).await;

    let served = h
        .router
        .handle("Ab12Cd3xyz9.png", &headers(&[(ACCEPT, "text/html")]))
        .await;

    assert_eq!(served.status(), StatusCode::GONE);
    assert_eq!(h.cache.lookup(&id).await, CacheLookup::Miss);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn store_outage_on_cold_miss_redirects_to_not_found() {
    let h = harness_with_store(ServeMode::Redirect, Arc::new(UnavailableStore));

    let served = h.router.handle(ID, &headers(&[(ACCEPT, "image/png")])).await;

    assert_eq!(location(&served), "/Ab12Cd3xyz9");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn protected_image_is_forbidden_as_plain_text() {
    let mut m = mapping("https://origin.example/a.png");
    m.password = Some("pbkdf2$hash".to_string());
    let h = harness(ServeMode::Redirect, vec![m]).await;

    let served = h.router.handle(ID, &headers(&[(ACCEPT, "*/*")])).await;

    let Served::Text { status, body } = served else {
        panic!("expected plain-text 403");
    };
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!body.contains("origin.example"));
    wait_for_events(&h.sink, 1);
    assert_eq!(h.sink.events()[0].access_type, AccessType::Denied);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn protected_image_ignores_cookie_for_image_requests() {
    let hash = "pbkdf2$hash";
    let mut m = mapping("https://origin.example/a.png");
    m.password = Some(hash.to_string());
    let h = harness(ServeMode::Redirect, vec![m]).await;

    let id = Identifier::new_unchecked(ID);
    let cookie = VerificationSigner::new(SECRET)
        .issue(&id, hash, Duration::from_secs(600), Timestamp::now())
        .unwrap();
    let mut request = headers(&[(ACCEPT, "image/png")]);
    request.insert(
        COOKIE,
        HeaderValue::from_str(&format!("{}={}", cookie.name, cookie.value)).unwrap(),
    );

    let served = h.router.handle(ID, &request).await;

    assert_eq!(served.status(), StatusCode::FORBIDDEN);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn verified_api_client_reaches_protected_image() {
    let hash = "pbkdf2$hash";
    let mut m = mapping("https://origin.example/a.png");
    m.password = Some(hash.to_string());
    let h = harness(ServeMode::Redirect, vec![m]).await;

    let id = Identifier::new_unchecked(ID);
    let cookie = VerificationSigner::new(SECRET)
        .issue(&id, hash, Duration::from_secs(600), Timestamp::now())
        .unwrap();
    let mut request = headers(&[(USER_AGENT, "curl/8.5.0"), (ACCEPT, "application/json")]);

    let denied = h.router.handle("Ab12Cd3xyz9.png", &request).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    request.insert(
        COOKIE,
        HeaderValue::from_str(&format!("theme=dark; {}={}", cookie.name, cookie.value)).unwrap(),
    );
    let served = h.router.handle("Ab12Cd3xyz9.png", &request).await;
    assert_eq!(location(&served), "https://origin.example/a.png");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn protected_browser_visit_is_sent_to_gate() {
    let mut m = mapping("https://origin.example/a.png");
    m.password = Some("pbkdf2$hash".to_string());
    let h = harness(ServeMode::Redirect, vec![m]).await;

    let served = h
        .router
        .handle(ID, &headers(&[(ACCEPT, "text/html,application/xhtml+xml")]))
        .await;

    assert_eq!(location(&served), "/Ab12Cd3xyz9/p");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn api_client_gets_metadata() {
    let h = harness(ServeMode::Redirect, vec![mapping("https://origin.example/a.png")]).await;

    let served = h
        .router
        .handle(ID, &headers(&[(ACCEPT, "application/json"), (USER_AGENT, "curl/8.5.0")]))
        .await;

    let Served::Json { status, body } = served else {
        panic!("expected metadata");
    };
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], ID);
    assert_eq!(body["url"], "https://origin.example/a.png");
    assert_eq!(body["filename"], "holiday.png");

    wait_for_events(&h.sink, 1);
    let event = &h.sink.events()[0];
    assert_eq!(event.access_type, AccessType::Metadata);
    assert_eq!(event.client_type, ClientType::Api);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cold_miss_populates_cache() {
    let h = harness(ServeMode::Redirect, vec![mapping("https://origin.example/a.png")]).await;
    let id = Identifier::new_unchecked(ID);
    assert!(!h.cache.contains_raw(&id));

    h.router.handle(ID, &headers(&[(ACCEPT, "image/png")])).await;

    let cached = h.cache.get(&id).await.unwrap();
    assert_eq!(cached.url, "https://origin.example/a.png");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cached_mapping_is_served_without_store() {
    let h = harness(ServeMode::Redirect, vec![]).await;
    let id = Identifier::new_unchecked(ID);
    h.cache
        .set(&id, &mapping("https://origin.example/cached.png"), None)
        .await;

    let served = h.router.handle(ID, &headers(&[(ACCEPT, "image/png")])).await;

    assert_eq!(location(&served), "https://origin.example/cached.png");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn proxy_mode_streams_origin_and_records_stats() {
    let origin = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/png")
                .set_body_bytes(b"png-bytes".as_slice()),
        )
        .mount(&origin)
        .await;

    let url = format!("{}/a.png", origin.uri());
    let h = harness(ServeMode::Proxy, vec![mapping(&url)]).await;

    let mut request = headers(&[(ACCEPT, "image/webp,image/*")]);
    request.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));
    let served = h.router.handle(ID, &request).await;

    let Served::Upstream(upstream) = served else {
        panic!("expected proxied image");
    };
    assert_eq!(upstream.status(), StatusCode::OK);
    assert_eq!(upstream.bytes().await.unwrap().as_ref(), b"png-bytes");

    let sent = origin.received_requests().await.unwrap();
    assert_eq!(sent[0].headers.get("accept").unwrap(), "image/webp");

    wait_for_events(&h.sink, 1);
    let event = &h.sink.events()[0];
    assert_eq!(event.access_type, AccessType::Proxy);
    assert_eq!(event.client_ip.as_deref(), Some("203.0.113.9"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn proxy_failure_serves_placeholder() {
    let h = harness(
        ServeMode::Proxy,
        vec![mapping("http://127.0.0.1:1/unreachable.png")],
    )
    .await;

    let served = h.router.handle(ID, &headers(&[(ACCEPT, "image/png")])).await;

    assert!(matches!(served, Served::Placeholder(_)));
    assert_eq!(served.status(), StatusCode::BAD_GATEWAY);
    wait_for_events(&h.sink, 1);
    assert_eq!(h.sink.events()[0].access_type, AccessType::Failed);
}
