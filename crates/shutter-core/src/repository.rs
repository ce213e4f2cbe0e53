use crate::error::StorageError;
use crate::identifier::Identifier;
use crate::mapping::ImageMapping;
use async_trait::async_trait;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A read-only view of the persistent mapping store.
///
/// The router only ever reads mappings; writes belong to the upload pipeline.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Retrieves the mapping for a given identifier.
    ///
    /// Returns `None` if the identifier does not exist or was soft-deleted.
    /// Expired mappings are still returned so callers can tell expiry apart
    /// from absence.
    async fn get(&self, id: &Identifier) -> Result<Option<ImageMapping>>;

    /// Checks whether an identifier exists in the store.
    async fn exists(&self, id: &Identifier) -> Result<bool>;
}

#[async_trait]
pub trait Repository: ReadRepository {
    /// Inserts a new mapping. Returns `Err(Conflict)` if the identifier is taken.
    async fn insert(&self, mapping: ImageMapping) -> Result<()>;

    /// Soft-deletes the mapping for a given identifier.
    /// Returns `true` if the mapping existed and was removed.
    async fn delete(&self, id: &Identifier) -> Result<bool>;
}
