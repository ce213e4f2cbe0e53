use async_trait::async_trait;
use jiff::Timestamp;
use redis::AsyncCommands;
use shutter_core::{CacheEntry, CacheError, CacheLookup, Identifier, ImageMapping, MappingCache};
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::link::RedisLink;

const DEFAULT_PREFIX: &str = "shutter:img:";
const SCAN_BATCH: usize = 200;

/// The distributed cache tier.
///
/// Stores JSON-encoded [`CacheEntry`] values under a configurable key prefix.
/// Every failure (connection, timeout, bad payload) is logged here and
/// reported to the caller as a miss or a no-op.
#[derive(Debug, Clone)]
pub struct RedisMappingCache {
    link: RedisLink,
    key_prefix: String,
}

impl RedisMappingCache {
    /// Creates a new Redis mapping cache with the default `shutter:img:` prefix.
    pub fn new(link: RedisLink) -> Self {
        Self::with_prefix(link, DEFAULT_PREFIX)
    }

    /// Creates a new Redis mapping cache with a custom key prefix.
    pub fn with_prefix(link: RedisLink, key_prefix: impl Into<String>) -> Self {
        Self {
            link,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn link(&self) -> &RedisLink {
        &self.link
    }

    /// Whether the backing server answers a `PING`.
    pub async fn ping(&self) -> bool {
        self.link.ping().await
    }

    fn cache_key(&self, id: &Identifier) -> String {
        format!("{}{}", self.key_prefix, id.as_str())
    }

    async fn fetch(&self, key: String) -> Result<Option<CacheEntry>, CacheError> {
        let cached = self
            .link
            .run("failed to fetch value from Redis", {
                let key = key.clone();
                move |mut conn| async move { conn.get::<_, Option<String>>(&key).await }
            })
            .await?;

        cached
            .map(|json| {
                serde_json::from_str::<CacheEntry>(&json).map_err(|e| {
                    CacheError::InvalidData(format!("invalid cached value for key '{key}': {e}"))
                })
            })
            .transpose()
    }

    async fn remove(&self, key: String) -> Result<(), CacheError> {
        self.link
            .run("failed to delete value from Redis", move |mut conn| async move {
                conn.del::<_, ()>(&key).await
            })
            .await
    }

    async fn scan_batch(&self, cursor: u64) -> Result<(u64, Vec<String>), CacheError> {
        let pattern = format!("{}*", self.key_prefix);
        self.link
            .run("failed to scan Redis keys", move |mut conn| async move {
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async::<(u64, Vec<String>)>(&mut conn)
                    .await
            })
            .await
    }
}

/// Redis `EX` takes whole seconds; round up so entries never vanish early.
fn expiry_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl MappingCache for RedisMappingCache {
    async fn lookup(&self, id: &Identifier) -> CacheLookup {
        let key = self.cache_key(id);
        trace!(id = %id, "Fetching mapping from Redis cache");

        match self.fetch(key.clone()).await {
            Ok(Some(entry)) => {
                let lookup = entry.into_lookup(Timestamp::now());
                if lookup.is_hit() {
                    debug!(id = %id, "Redis cache hit");
                } else {
                    debug!(id = %id, "Redis cache entry expired, evicting");
                    if let Err(e) = self.remove(key).await {
                        warn!(id = %id, error = %e, "Failed to evict stale entry from Redis");
                    }
                }
                lookup
            }
            Ok(None) => {
                trace!(id = %id, "Cache miss in Redis");
                CacheLookup::Miss
            }
            Err(e @ CacheError::InvalidData(_)) => {
                warn!(id = %id, error = %e, "Dropping undecodable Redis entry");
                if let Err(e) = self.remove(key).await {
                    warn!(id = %id, error = %e, "Failed to evict undecodable entry from Redis");
                }
                CacheLookup::Miss
            }
            Err(e) => {
                warn!(id = %id, error = %e, "Redis get failed, treating as miss");
                CacheLookup::Miss
            }
        }
    }

    async fn set(&self, id: &Identifier, mapping: &ImageMapping, ttl: Option<Duration>) {
        let key = self.cache_key(id);
        trace!(id = %id, "Storing mapping in Redis cache");

        let now = Timestamp::now();
        let entry = CacheEntry::new(mapping.clone(), ttl, now);
        if !entry.is_live(now) {
            debug!(id = %id, "Skipping Redis write for an already expired entry");
            return;
        }

        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                let e = CacheError::Serialization(format!("failed to serialize cache value: {e}"));
                warn!(id = %id, error = %e, "Failed to serialize mapping for caching");
                return;
            }
        };

        let written = match entry.remaining_ttl(now) {
            Some(remaining) => {
                let seconds = expiry_seconds(remaining);
                self.link
                    .run("failed to write value to Redis", move |mut conn| async move {
                        conn.set_ex::<_, _, ()>(&key, json, seconds).await
                    })
                    .await
            }
            None => {
                self.link
                    .run("failed to write value to Redis", move |mut conn| async move {
                        conn.set::<_, _, ()>(&key, json).await
                    })
                    .await
            }
        };

        match written {
            Ok(()) => debug!(id = %id, "Cached mapping in Redis"),
            Err(e) => warn!(id = %id, error = %e, "Failed to cache mapping in Redis"),
        }
    }

    async fn delete(&self, id: &Identifier) {
        trace!(id = %id, "Removing mapping from Redis cache");
        if let Err(e) = self.remove(self.cache_key(id)).await {
            warn!(id = %id, error = %e, "Failed to remove mapping from Redis cache");
        }
    }

    async fn clear(&self) {
        let mut cursor = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys) = match self.scan_batch(cursor).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, removed, "Redis clear aborted");
                    return;
                }
            };

            if !keys.is_empty() {
                let count = keys.len();
                let deleted = self
                    .link
                    .run("failed to delete keys from Redis", move |mut conn| async move {
                        conn.del::<_, ()>(keys).await
                    })
                    .await;
                if let Err(e) = deleted {
                    warn!(error = %e, removed, "Redis clear aborted");
                    return;
                }
                removed += count;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(removed, prefix = %self.key_prefix, "Cleared Redis cache");
    }

    fn name(&self) -> &'static str {
        "distributed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_rounds_up_to_whole_seconds() {
        assert_eq!(expiry_seconds(Duration::from_secs(60)), 60);
        assert_eq!(expiry_seconds(Duration::from_millis(60_001)), 61);
        assert_eq!(expiry_seconds(Duration::from_millis(10)), 1);
        assert_eq!(expiry_seconds(Duration::ZERO), 1);
    }

    #[test]
    fn keys_use_prefix() {
        let link = RedisLink::open("redis://127.0.0.1:1", Default::default()).unwrap();
        let cache = RedisMappingCache::with_prefix(link, "test:");
        let id = Identifier::new_unchecked("abc123");
        assert_eq!(cache.cache_key(&id), "test:abc123");
        assert_eq!(cache.name(), "distributed");
    }
}
