use async_trait::async_trait;
use shutter_core::{CacheLookup, Identifier, ImageMapping, MappingCache};
use std::time::Duration;
use tracing::{debug, trace};

const DEFAULT_BACKFILL_TTL: Duration = Duration::from_secs(60);

/// A two-level cache composing a local tier with a distributed one.
///
/// - **Get**: try L1 first; on a miss try L2 and, on an L2 hit, backfill L1
///   for [`backfill_ttl`](Self::with_backfill_ttl) so later reads stay local.
/// - **Set**: write-through to L2, then L1.
/// - **Delete** / **Clear**: both tiers.
///
/// Neither tier reports failures, so a broken L2 simply makes the layered
/// cache behave like L1 alone.
///
/// # Example
///
/// ```rust
/// use shutter_cache::{LayeredCache, MokaMappingCache};
///
/// let l1 = MokaMappingCache::with_capacity(10_000);
/// let l2 = MokaMappingCache::with_capacity(100_000);
/// let cache = LayeredCache::new(l1, l2);
/// ```
#[derive(Debug, Clone)]
pub struct LayeredCache<L1, L2> {
    l1: L1,
    l2: L2,
    backfill_ttl: Duration,
}

impl<L1, L2> LayeredCache<L1, L2> {
    pub fn new(l1: L1, l2: L2) -> Self {
        Self {
            l1,
            l2,
            backfill_ttl: DEFAULT_BACKFILL_TTL,
        }
    }

    /// Overrides how long an L2 hit stays in L1.
    pub fn with_backfill_ttl(mut self, ttl: Duration) -> Self {
        self.backfill_ttl = ttl;
        self
    }

    /// Returns a reference to the L1 cache.
    pub fn l1(&self) -> &L1 {
        &self.l1
    }

    /// Returns a reference to the L2 cache.
    pub fn l2(&self) -> &L2 {
        &self.l2
    }

    /// Consumes the layered cache and returns the inner caches.
    pub fn into_inner(self) -> (L1, L2) {
        (self.l1, self.l2)
    }
}

#[async_trait]
impl<L1, L2> MappingCache for LayeredCache<L1, L2>
where
    L1: MappingCache,
    L2: MappingCache,
{
    async fn lookup(&self, id: &Identifier) -> CacheLookup {
        trace!(id = %id, "Fetching mapping from layered cache");

        match self.l1.lookup(id).await {
            CacheLookup::Hit(mapping) => {
                debug!(id = %id, tier = self.l1.name(), "L1 cache hit");
                return CacheLookup::Hit(mapping);
            }
            CacheLookup::Expired(mapping) => {
                debug!(id = %id, tier = self.l1.name(), "L1 holds an expired mapping");
                self.l2.delete(id).await;
                return CacheLookup::Expired(mapping);
            }
            CacheLookup::Miss => trace!(id = %id, "L1 cache miss, trying L2"),
        }

        let lookup = self.l2.lookup(id).await;
        if let CacheLookup::Hit(mapping) = &lookup {
            debug!(id = %id, tier = self.l2.name(), "L2 cache hit, backfilling L1");
            self.l1.set(id, mapping, Some(self.backfill_ttl)).await;
        }
        lookup
    }

    async fn set(&self, id: &Identifier, mapping: &ImageMapping, ttl: Option<Duration>) {
        trace!(id = %id, "Storing mapping in layered cache");
        self.l2.set(id, mapping, ttl).await;
        self.l1.set(id, mapping, ttl).await;
    }

    async fn delete(&self, id: &Identifier) {
        trace!(id = %id, "Removing mapping from layered cache");
        self.l1.delete(id).await;
        self.l2.delete(id).await;
    }

    async fn clear(&self) {
        self.l1.clear().await;
        self.l2.clear().await;
    }

    fn name(&self) -> &'static str {
        "layered"
    }
}
