use shutter_core::{Identifier, ImageMapping, ReadRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Bridges a cache miss to the persistent store.
///
/// Store faults and slow lookups are logged and reported as "not found";
/// `resolve` never fails.
#[derive(Clone)]
pub struct ResourceResolver {
    repository: Arc<dyn ReadRepository>,
    timeout: Duration,
}

impl std::fmt::Debug for ResourceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceResolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ResourceResolver {
    pub fn new(repository: Arc<dyn ReadRepository>) -> Self {
        Self {
            repository,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn resolve(&self, id: &Identifier) -> Option<ImageMapping> {
        trace!(id = %id, "Resolving mapping from store");

        match tokio::time::timeout(self.timeout, self.repository.get(id)).await {
            Ok(Ok(Some(mapping))) => {
                debug!(id = %id, "Resolved mapping from store");
                Some(mapping)
            }
            Ok(Ok(None)) => {
                trace!(id = %id, "Mapping not found in store");
                None
            }
            Ok(Err(e)) => {
                warn!(id = %id, error = %e, "Store lookup failed, treating as not found");
                None
            }
            Err(_) => {
                warn!(id = %id, timeout = ?self.timeout, "Store lookup timed out, treating as not found");
                None
            }
        }
    }
}
