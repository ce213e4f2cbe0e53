use clap::{Parser, ValueEnum};
use shutter_router::ServeMode;
use shutter_telemetry::LogFormat;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;

pub const LISTEN_ADDR_ENV: &str = "SHUTTER_LISTEN_ADDR";
pub const CACHE_BACKEND_ENV: &str = "SHUTTER_CACHE_BACKEND";
pub const CACHE_TTL_ENV: &str = "SHUTTER_CACHE_TTL_SECS";
pub const LOCAL_CACHE_CAPACITY_ENV: &str = "SHUTTER_LOCAL_CACHE_CAPACITY";
pub const REDIS_URL_ENV: &str = "SHUTTER_REDIS_URL";
pub const REDIS_PREFIX_ENV: &str = "SHUTTER_REDIS_PREFIX";
pub const STORAGE_BACKEND_ENV: &str = "SHUTTER_STORAGE_BACKEND";
pub const MYSQL_DSN_ENV: &str = "SHUTTER_MYSQL_DSN";
pub const COOKIE_SECRET_ENV: &str = "SHUTTER_COOKIE_SECRET";
pub const SERVE_MODE_ENV: &str = "SHUTTER_SERVE_MODE";
pub const PREVIEW_BASE_ENV: &str = "SHUTTER_PREVIEW_BASE";
pub const NOT_FOUND_PREFIX_ENV: &str = "SHUTTER_NOT_FOUND_PREFIX";
pub const PROXY_TIMEOUT_ENV: &str = "SHUTTER_PROXY_TIMEOUT_MS";
pub const PROXY_RETRIES_ENV: &str = "SHUTTER_PROXY_RETRIES";
pub const STATS_BACKEND_ENV: &str = "SHUTTER_STATS_BACKEND";
pub const LOG_FORMAT_ENV: &str = "SHUTTER_LOG_FORMAT";
pub const OTLP_ENDPOINT_ENV: &str = "SHUTTER_OTLP_ENDPOINT";

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CacheBackendArg {
    #[value(name = "local")]
    Local,
    #[value(name = "redis")]
    Redis,
    #[value(name = "layered")]
    Layered,
}

impl CacheBackendArg {
    pub fn needs_redis(&self) -> bool {
        matches!(self, CacheBackendArg::Redis | CacheBackendArg::Layered)
    }
}

impl Display for CacheBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackendArg::Local => write!(f, "local"),
            CacheBackendArg::Redis => write!(f, "redis"),
            CacheBackendArg::Layered => write!(f, "layered"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackendArg {
    #[value(name = "in-memory")]
    InMemory,
    #[value(name = "mysql")]
    Mysql,
}

impl Display for StorageBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackendArg::InMemory => write!(f, "in-memory"),
            StorageBackendArg::Mysql => write!(f, "mysql"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatsBackendArg {
    #[value(name = "tracing")]
    Tracing,
    #[value(name = "redis")]
    Redis,
    #[value(name = "noop")]
    Noop,
}

impl Display for StatsBackendArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsBackendArg::Tracing => write!(f, "tracing"),
            StatsBackendArg::Redis => write!(f, "redis"),
            StatsBackendArg::Noop => write!(f, "noop"),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "shutter", about = "Unified image-access router")]
pub struct Cli {
    #[arg(long, env = LISTEN_ADDR_ENV, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: SocketAddr,

    #[arg(
        long,
        env = CACHE_BACKEND_ENV,
        value_enum,
        default_value_t = CacheBackendArg::Local
    )]
    pub cache: CacheBackendArg,

    /// TTL for mappings cached after a store lookup.
    #[arg(long, env = CACHE_TTL_ENV, default_value_t = 3600)]
    pub cache_ttl_secs: u64,

    #[arg(long, env = LOCAL_CACHE_CAPACITY_ENV, default_value_t = 10_000)]
    pub local_cache_capacity: u64,

    #[arg(long, env = REDIS_URL_ENV)]
    pub redis_url: Option<String>,

    #[arg(long, env = REDIS_PREFIX_ENV, default_value = "shutter:img:")]
    pub redis_prefix: String,

    #[arg(
        long,
        env = STORAGE_BACKEND_ENV,
        value_enum,
        default_value_t = StorageBackendArg::InMemory
    )]
    pub storage: StorageBackendArg,

    #[arg(long, env = MYSQL_DSN_ENV, required_if_eq("storage", "mysql"))]
    pub mysql_dsn: Option<String>,

    /// HMAC key for password verification cookies. Without it no cookie
    /// verifies.
    #[arg(long, env = COOKIE_SECRET_ENV, hide_env_values = true)]
    pub cookie_secret: Option<String>,

    #[arg(long, env = SERVE_MODE_ENV, default_value_t = ServeMode::Proxy)]
    pub serve_mode: ServeMode,

    /// Prefix for preview gate redirects, e.g. `https://img.example`.
    #[arg(long, env = PREVIEW_BASE_ENV, default_value = "")]
    pub preview_base: String,

    #[arg(long, env = NOT_FOUND_PREFIX_ENV, default_value = "")]
    pub not_found_prefix: String,

    #[arg(long, env = PROXY_TIMEOUT_ENV, default_value_t = 8000)]
    pub proxy_timeout_ms: u64,

    #[arg(long, env = PROXY_RETRIES_ENV, default_value_t = 2)]
    pub proxy_retries: u32,

    #[arg(
        long,
        env = STATS_BACKEND_ENV,
        value_enum,
        default_value_t = StatsBackendArg::Tracing
    )]
    pub stats: StatsBackendArg,

    #[arg(long, env = LOG_FORMAT_ENV, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[arg(long, env = OTLP_ENDPOINT_ENV)]
    pub otlp_endpoint: Option<String>,
}

impl Cli {
    pub fn needs_redis(&self) -> bool {
        self.cache.needs_redis() || self.stats == StatsBackendArg::Redis
    }
}
