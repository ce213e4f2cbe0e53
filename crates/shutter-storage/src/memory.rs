use async_trait::async_trait;
use dashmap::DashMap;
use shutter_core::repository::{ReadRepository, Repository, Result};
use shutter_core::{Identifier, ImageMapping, StorageError};

/// In-memory mapping store backed by DashMap.
///
/// Used for local development and tests. Deleted rows are removed outright;
/// expired rows are kept and returned, leaving the expiry decision to the
/// caller.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    storage: DashMap<String, ImageMapping>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: DashMap::with_capacity(capacity),
        }
    }

    /// Builds a repository pre-populated with `mappings`, later entries
    /// replacing earlier ones with the same identifier.
    pub fn seeded(mappings: impl IntoIterator<Item = ImageMapping>) -> Self {
        let repo = Self::new();
        for mapping in mappings {
            repo.storage.insert(mapping.id.as_str().to_owned(), mapping);
        }
        repo
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[async_trait]
impl ReadRepository for InMemoryRepository {
    async fn get(&self, id: &Identifier) -> Result<Option<ImageMapping>> {
        Ok(self.storage.get(id.as_str()).map(|entry| entry.clone()))
    }

    async fn exists(&self, id: &Identifier) -> Result<bool> {
        Ok(self.storage.contains_key(id.as_str()))
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn insert(&self, mapping: ImageMapping) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.storage.entry(mapping.id.as_str().to_owned()) {
            Entry::Occupied(_) => Err(StorageError::Conflict(mapping.id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(mapping);
                Ok(())
            }
        }
    }

    async fn delete(&self, id: &Identifier) -> Result<bool> {
        Ok(self.storage.remove(id.as_str()).is_some())
    }
}
