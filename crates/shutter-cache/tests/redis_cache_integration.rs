use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use redis::AsyncCommands;
use shutter_cache::{LayeredCache, LinkConfig, MokaMappingCache, RedisLink, RedisMappingCache};
use shutter_core::{CacheEntry, CacheLookup, Identifier, ImageMapping, MappingCache};
use shutter_test_infra::RedisServer;

/// Test fixture that manages a Redis container using test-infra.
struct RedisFixture {
    redis: RedisServer,
    url: String,
}

impl RedisFixture {
    async fn start() -> Self {
        let redis = RedisServer::new().await.expect("Failed to start Redis");
        let url = redis.url().await.expect("Failed to get Redis url");
        Self { redis, url }
    }

    fn cache(&self) -> RedisMappingCache {
        self.cache_with_prefix("shutter:img:")
    }

    fn cache_with_prefix(&self, prefix: &str) -> RedisMappingCache {
        let link = RedisLink::open(&self.url, LinkConfig::default()).expect("valid Redis url");
        RedisMappingCache::with_prefix(link, prefix)
    }

    async fn raw(&self) -> redis::aio::MultiplexedConnection {
        self.redis
            .connection()
            .await
            .expect("Failed to get Redis connection")
    }
}

fn id(code: &str) -> Identifier {
    Identifier::new(code).unwrap()
}

fn test_mapping(code: &str) -> ImageMapping {
    ImageMapping {
        id: id(code),
        url: format!("https://origin.example/{code}.png"),
        filename: format!("{code}.png"),
        extension: Some("png".to_string()),
        created_at: Timestamp::now(),
        expires_at: None,
        password: None,
        short_url: format!("https://img.example/{code}"),
    }
}

#[tokio::test]
async fn redis_cache_basic_get_set() {
    let fixture = RedisFixture::start().await;
    let cache = fixture.cache();
    let code = id("test123");
    let mapping = test_mapping("test123");

    assert!(cache.get(&code).await.is_none(), "cache starts empty");

    cache.set(&code, &mapping, None).await;

    assert_eq!(cache.get(&code).await, Some(mapping));
    assert!(cache.exists(&code).await);
    assert!(cache.ping().await);
}

#[tokio::test]
async fn redis_cache_delete() {
    let fixture = RedisFixture::start().await;
    let cache = fixture.cache();
    let code = id("delete1");

    cache.set(&code, &test_mapping("delete1"), None).await;
    assert!(cache.get(&code).await.is_some());

    cache.delete(&code).await;
    assert!(cache.get(&code).await.is_none());

    // Deleting twice is a no-op.
    cache.delete(&code).await;
}

#[tokio::test]
async fn ttl_is_applied_server_side() {
    let fixture = RedisFixture::start().await;
    let cache = fixture.cache();
    let code = id("ttl1234");

    cache
        .set(&code, &test_mapping("ttl1234"), Some(Duration::from_secs(60)))
        .await;

    let mut conn = fixture.raw().await;
    let ttl: i64 = conn.ttl("shutter:img:ttl1234").await.unwrap();
    assert!((1..=60).contains(&ttl), "unexpected TTL {ttl}");
}

#[tokio::test]
async fn short_ttl_entry_disappears() {
    let fixture = RedisFixture::start().await;
    let cache = fixture.cache();
    let code = id("short1");

    cache
        .set(&code, &test_mapping("short1"), Some(Duration::from_secs(1)))
        .await;
    assert!(cache.get(&code).await.is_some());

    awaitility::at_most(Duration::from_secs(5))
        .poll_interval(Duration::from_millis(100))
        .until_async(|| async { cache.get(&code).await.is_none() })
        .await;
}

#[tokio::test]
async fn stale_entry_is_evicted_on_read() {
    let fixture = RedisFixture::start().await;
    let cache = fixture.cache();
    let code = id("stale12");

    // Written without EX so only the embedded cache expiry guards it.
    let entry = CacheEntry {
        mapping: test_mapping("stale12"),
        cache_expires_at: Some(Timestamp::now() - SignedDuration::from_secs(5)),
    };
    let mut conn = fixture.raw().await;
    let _: () = conn
        .set("shutter:img:stale12", serde_json::to_string(&entry).unwrap())
        .await
        .unwrap();

    assert!(cache.get(&code).await.is_none());

    let exists: bool = conn.exists("shutter:img:stale12").await.unwrap();
    assert!(!exists, "stale entry should be deleted on read");
}

#[tokio::test]
async fn business_expired_entry_is_not_returned() {
    let fixture = RedisFixture::start().await;
    let cache = fixture.cache();
    let code = id("expired1");

    let mut mapping = test_mapping("expired1");
    mapping.expires_at = Some(Timestamp::now() - SignedDuration::from_hours(24));
    let entry = CacheEntry {
        mapping: mapping.clone(),
        cache_expires_at: None,
    };
    let mut conn = fixture.raw().await;
    let _: () = conn
        .set("shutter:img:expired1", serde_json::to_string(&entry).unwrap())
        .await
        .unwrap();

    assert_eq!(cache.lookup(&code).await, CacheLookup::Expired(mapping));
    let exists: bool = conn.exists("shutter:img:expired1").await.unwrap();
    assert!(!exists, "expired entry should be deleted on read");
    assert!(cache.get(&code).await.is_none());
    assert!(!cache.exists(&code).await);
}

#[tokio::test]
async fn undecodable_payload_is_a_miss() {
    let fixture = RedisFixture::start().await;
    let cache = fixture.cache();

    let mut conn = fixture.raw().await;
    let _: () = conn.set("shutter:img:garbage", "not json").await.unwrap();

    assert!(cache.get(&id("garbage")).await.is_none());
    let exists: bool = conn.exists("shutter:img:garbage").await.unwrap();
    assert!(!exists);
}

#[tokio::test]
async fn clear_only_touches_own_prefix() {
    let fixture = RedisFixture::start().await;
    let ours = fixture.cache_with_prefix("ours:");
    let theirs = fixture.cache_with_prefix("theirs:");

    for i in 0..500 {
        let code = format!("code{i}");
        ours.set(&id(&code), &test_mapping(&code), None).await;
    }
    theirs.set(&id("keep12"), &test_mapping("keep12"), None).await;

    ours.clear().await;

    assert!(ours.get(&id("code0")).await.is_none());
    assert!(ours.get(&id("code499")).await.is_none());
    assert!(theirs.get(&id("keep12")).await.is_some());
}

#[tokio::test]
async fn layered_cache_backfills_from_redis() {
    let fixture = RedisFixture::start().await;
    let cache = LayeredCache::new(MokaMappingCache::new(), fixture.cache());
    let code = id("layer1");
    let mapping = test_mapping("layer1");

    cache.l2().set(&code, &mapping, None).await;

    assert_eq!(cache.get(&code).await, Some(mapping.clone()));
    assert_eq!(cache.l1().get(&code).await, Some(mapping));
}

#[tokio::test]
async fn outage_degrades_to_miss() {
    let fixture = RedisFixture::start().await;
    let cache = fixture.cache();
    let code = id("outage1");
    let mapping = test_mapping("outage1");

    cache.set(&code, &mapping, None).await;
    assert!(cache.get(&code).await.is_some());

    fixture.redis.stop().await.expect("stop redis");

    // Nothing panics or hangs; every call reads as empty.
    let started = std::time::Instant::now();
    assert!(cache.get(&code).await.is_none());
    cache.set(&code, &mapping, None).await;
    cache.delete(&code).await;
    cache.clear().await;
    assert!(!cache.exists(&code).await);
    assert!(!cache.ping().await);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn unreachable_server_behaves_like_empty_cache() {
    let link = RedisLink::open(
        "redis://127.0.0.1:1",
        LinkConfig::builder()
            .connect_timeout(Duration::from_millis(200))
            .build(),
    )
    .unwrap();
    let cache = RedisMappingCache::new(link);
    let code = id("nobody");

    cache.set(&code, &test_mapping("nobody"), None).await;
    assert!(cache.get(&code).await.is_none());
    assert!(!cache.exists(&code).await);
    assert!(!cache.ping().await);
}
