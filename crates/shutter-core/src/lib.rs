//! Core types and traits for the shutter image-access router.
//!
//! This crate provides the domain types shared by the cache tiers, the
//! persistent-store adapters and the router itself.

pub mod cache;
pub mod error;
pub mod identifier;
pub mod mapping;
pub mod repository;

pub use cache::{CacheEntry, CacheLookup, MappingCache};
pub use error::{CacheError, CoreError, StorageError};
pub use identifier::{Identifier, RequestTarget};
pub use mapping::{ImageMapping, PERMANENT_HORIZON};
pub use repository::{ReadRepository, Repository};
