//! Disposable Redis and MySQL containers for integration tests.

mod error;
mod mysql;
mod redis;

pub use error::{Result, TestInfraError};
pub use mysql::{MySqlServer, MysqlConfig};
pub use self::redis::RedisServer;
