use async_trait::async_trait;
use jiff::Timestamp;
use moka::future::Cache;
use shutter_core::{CacheEntry, CacheLookup, Identifier, ImageMapping, MappingCache};
use std::time::Duration;
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

const DEFAULT_CAPACITY: u64 = 10_000;

/// An in-process cache tier backed by Moka.
///
/// Each value carries its own cache-tier expiry, checked lazily on read.
/// The optional Moka-level TTL only acts as a ceiling for entries that were
/// stored without one.
#[derive(Debug, Clone)]
pub struct MokaMappingCache {
    cache: Cache<String, CacheEntry>,
}

impl MokaMappingCache {
    /// Creates a new Moka mapping cache with default settings.
    ///
    /// The cache will have a default maximum capacity of 10,000 entries.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a new Moka mapping cache with a custom maximum capacity.
    pub fn with_capacity(max_capacity: u64) -> Self {
        let cache = Cache::builder().max_capacity(max_capacity).build();
        Self { cache }
    }

    /// Creates a new Moka mapping cache whose entries never outlive `ttl`.
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    /// Returns a builder for creating a custom cache configuration.
    pub fn builder() -> LocalCacheConfigBuilder {
        LocalCacheConfig::builder()
    }

    /// Whether the key is physically present, regardless of liveness.
    pub fn contains_raw(&self, id: &Identifier) -> bool {
        self.cache.contains_key(id.as_str())
    }
}

impl Default for MokaMappingCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MappingCache for MokaMappingCache {
    async fn lookup(&self, id: &Identifier) -> CacheLookup {
        trace!(id = %id, "Fetching mapping from local cache");

        let Some(entry) = self.cache.get(id.as_str()).await else {
            return CacheLookup::Miss;
        };
        let lookup = entry.into_lookup(Timestamp::now());
        if lookup.is_hit() {
            debug!(id = %id, "Local cache hit");
        } else {
            debug!(id = %id, "Local cache entry expired, evicting");
            self.cache.invalidate(id.as_str()).await;
        }
        lookup
    }

    async fn set(&self, id: &Identifier, mapping: &ImageMapping, ttl: Option<Duration>) {
        trace!(id = %id, "Storing mapping in local cache");

        let entry = CacheEntry::new(mapping.clone(), ttl, Timestamp::now());
        self.cache.insert(id.as_str().to_string(), entry).await;
    }

    async fn delete(&self, id: &Identifier) {
        trace!(id = %id, "Removing mapping from local cache");
        self.cache.invalidate(id.as_str()).await;
    }

    async fn clear(&self) {
        self.cache.invalidate_all();
        debug!("Cleared local cache");
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Configuration for creating a [`MokaMappingCache`] with custom settings.
#[derive(Debug, TypedBuilder, Default)]
pub struct LocalCacheConfig {
    /// Maximum number of entries the cache can hold.
    #[builder(default, setter(strip_option))]
    max_capacity: Option<u64>,
    /// Upper bound on how long any entry may stay cached.
    #[builder(default, setter(strip_option))]
    ttl: Option<Duration>,
}

impl From<LocalCacheConfig> for MokaMappingCache {
    fn from(config: LocalCacheConfig) -> Self {
        let mut builder =
            Cache::builder().max_capacity(config.max_capacity.unwrap_or(DEFAULT_CAPACITY));

        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }

        MokaMappingCache {
            cache: builder.build(),
        }
    }
}
