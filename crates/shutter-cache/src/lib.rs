//! Cache tiers for image mappings: an in-process Moka tier, a distributed
//! Redis tier, and a layered composition of the two.

pub mod layered;
pub mod link;
pub mod moka;
pub mod redis;

pub use layered::LayeredCache;
pub use link::{LinkConfig, ReconnectPolicy, RedisLink};
pub use self::moka::{LocalCacheConfig, MokaMappingCache};
pub use self::redis::RedisMappingCache;
