use crate::identifier::Identifier;
use crate::mapping::{non_negative, ImageMapping};
use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cache tier for image mappings.
///
/// Implementations never surface backend failures: a broken tier behaves
/// like an empty one (`None` / `false` / no-op) and logs the failure at its
/// own boundary. Callers therefore never special-case a degraded tier.
#[async_trait]
pub trait MappingCache: Send + Sync + 'static {
    /// Look a mapping up, telling a business-expired entry apart from a miss.
    ///
    /// Stale entries are evicted on read. One whose cache-tier expiry passed
    /// is a [`CacheLookup::Miss`]; one whose mapping expired is reported as
    /// [`CacheLookup::Expired`] so the caller can answer without the store.
    async fn lookup(&self, id: &Identifier) -> CacheLookup;

    /// Get a live mapping from the cache.
    async fn get(&self, id: &Identifier) -> Option<ImageMapping> {
        self.lookup(id).await.into_live()
    }

    /// Store a mapping with an optional cache-tier TTL.
    ///
    /// The effective expiry never outlives the mapping's own `expires_at`.
    async fn set(&self, id: &Identifier, mapping: &ImageMapping, ttl: Option<Duration>);

    /// Remove a mapping. Removing an absent key is not an error.
    async fn delete(&self, id: &Identifier);

    /// Whether a live entry exists for `id`.
    async fn exists(&self, id: &Identifier) -> bool {
        self.get(id).await.is_some()
    }

    /// Drop every entry owned by this tier.
    async fn clear(&self);

    /// Short tier name used in logs.
    fn name(&self) -> &'static str;
}

/// Outcome of [`MappingCache::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(ImageMapping),
    /// The entry was present but its mapping had expired. Already evicted.
    Expired(ImageMapping),
    Miss,
}

impl CacheLookup {
    pub fn into_live(self) -> Option<ImageMapping> {
        match self {
            CacheLookup::Hit(mapping) => Some(mapping),
            CacheLookup::Expired(_) | CacheLookup::Miss => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }
}

/// A cached mapping plus its cache-tier expiry.
///
/// The cache-tier expiry is independent of the mapping's business expiry,
/// but is clamped so that it never exceeds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub mapping: ImageMapping,
    pub cache_expires_at: Option<Timestamp>,
}

impl CacheEntry {
    pub fn new(mapping: ImageMapping, ttl: Option<Duration>, now: Timestamp) -> Self {
        let ttl_expiry = ttl.and_then(|ttl| {
            SignedDuration::try_from(ttl)
                .ok()
                .and_then(|span| now.checked_add(span).ok())
        });

        let cache_expires_at = match (ttl_expiry, mapping.expires_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        Self {
            mapping,
            cache_expires_at,
        }
    }

    /// Whether the entry may still be served at `now`.
    pub fn is_live(&self, now: Timestamp) -> bool {
        let cache_live = self.cache_expires_at.is_none_or(|at| now < at);
        cache_live && !self.mapping.is_expired(now)
    }

    /// Sorts the entry into a lookup outcome at `now`. Business expiry wins
    /// over cache-tier expiry.
    pub fn into_lookup(self, now: Timestamp) -> CacheLookup {
        if self.mapping.is_expired(now) {
            CacheLookup::Expired(self.mapping)
        } else if self.is_live(now) {
            CacheLookup::Hit(self.mapping)
        } else {
            CacheLookup::Miss
        }
    }

    /// Remaining cache-tier lifetime, used when copying an entry between tiers.
    pub fn remaining_ttl(&self, now: Timestamp) -> Option<Duration> {
        self.cache_expires_at
            .map(|at| non_negative(at.duration_since(now)))
    }
}
