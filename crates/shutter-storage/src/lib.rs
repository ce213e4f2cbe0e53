//! Persistent-store adapters for image mappings.

pub mod memory;
pub mod mysql;

pub use memory::InMemoryRepository;
pub use mysql::MySqlRepository;
pub use shutter_core::repository::{ReadRepository, Repository, Result};
pub use shutter_core::StorageError;
