use std::result::Result as StdResult;
use thiserror::Error;

/// Errors raised while starting or talking to test containers.
#[derive(Debug, Error)]
pub enum TestInfraError {
    #[error("Container error: {0}")]
    Container(#[from] testcontainers::TestcontainersError),

    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

pub type Result<T> = StdResult<T, TestInfraError>;
