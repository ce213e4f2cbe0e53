use thiserror::Error;

/// Failures while wiring the server together at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("--redis-url is required when {0}")]
    MissingRedisUrl(&'static str),
    #[error("--mysql-dsn is required when storage backend is mysql")]
    MissingMysqlDsn,
    #[error("failed to open Redis link: {0}")]
    Redis(#[from] shutter_core::CacheError),
    #[error("failed to connect to MySQL: {0}")]
    Storage(#[from] shutter_core::StorageError),
    #[error("failed to build upstream client: {0}")]
    Proxy(#[from] shutter_router::UpstreamError),
}
