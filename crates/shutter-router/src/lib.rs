//! The unified image-access router.
//!
//! Resolves `/i/{identifier}[.ext]` requests to an [`ImageMapping`], then
//! decides how to answer them: a preview redirect, an inline image
//! (redirect or proxied), JSON metadata, or an error. The decision runs
//! through a cache tier, the persistent store, the expiry and password
//! rules, and a pure decision table.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use http::HeaderMap;
//! use shutter_cache::MokaMappingCache;
//! use shutter_router::{
//!     AccessPolicy, ImageRouter, ProxyConfig, ProxyFetcher, ResourceResolver, RouterConfig,
//!     ServeMode, StatsRecorder,
//! };
//! use shutter_storage::InMemoryRepository;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let router = ImageRouter::new(
//!     Arc::new(MokaMappingCache::new()),
//!     ResourceResolver::new(Arc::new(InMemoryRepository::new())),
//!     AccessPolicy::default(),
//!     ProxyFetcher::new(ProxyConfig::default())?,
//!     StatsRecorder::default(),
//!     RouterConfig::builder().serve_mode(ServeMode::Redirect).build(),
//! );
//!
//! let served = router.handle("abc123.png", &HeaderMap::new()).await;
//! println!("answered {}", served.status());
//! # Ok(())
//! # }
//! ```
//!
//! [`ImageMapping`]: shutter_core::ImageMapping

pub mod classifier;
pub mod config;
pub mod planner;
pub mod policy;
pub mod proxy;
pub mod resolver;
pub mod response;
pub mod router;
pub mod signer;
pub mod stats;

pub use classifier::{classify, Classification, ClientType};
pub use config::{RouterConfig, ServeMode};
pub use planner::{ErrorBody, ErrorKind, MappingMetadata, PlanContext, ResponsePlan};
pub use policy::{AccessPolicy, PasswordDecision};
pub use proxy::{ProxyConfig, ProxyFetcher, UpstreamError};
pub use resolver::ResourceResolver;
pub use response::{Placeholder, Served, UpstreamResponse};
pub use router::{client_ip, Decision, ImageRouter};
pub use signer::{VerificationCookie, VerificationSigner};
pub use stats::{
    AccessEvent, AccessType, NoopStatsSink, RedisStatsSink, StatsError, StatsRecorder, StatsSink,
    TracingStatsSink,
};
