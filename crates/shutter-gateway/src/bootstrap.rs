//! Builds the router and its collaborators from command-line settings.

use shutter_cache::{LayeredCache, LinkConfig, MokaMappingCache, RedisLink, RedisMappingCache};
use shutter_core::{MappingCache, ReadRepository};
use shutter_router::{
    AccessPolicy, ImageRouter, NoopStatsSink, ProxyConfig, ProxyFetcher, RedisStatsSink,
    ResourceResolver, RouterConfig, StatsRecorder, StatsSink, TracingStatsSink, VerificationSigner,
};
use shutter_storage::{InMemoryRepository, MySqlRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::{CacheBackendArg, Cli, StatsBackendArg, StorageBackendArg};
use crate::error::StartupError;
use crate::state::AppState;

/// Opens the shared Redis link when any component needs one. No
/// connection is attempted until first use.
pub fn redis_link(cli: &Cli) -> Result<Option<RedisLink>, StartupError> {
    if !cli.needs_redis() {
        return Ok(None);
    }
    let url = cli.redis_url.as_deref().ok_or(StartupError::MissingRedisUrl(
        "the redis or layered cache, or redis stats, are selected",
    ))?;
    Ok(Some(RedisLink::open(url, LinkConfig::default())?))
}

pub fn cache(cli: &Cli, link: Option<&RedisLink>) -> Result<Arc<dyn MappingCache>, StartupError> {
    let local = || MokaMappingCache::with_capacity(cli.local_cache_capacity);
    let distributed = || {
        link.cloned()
            .map(|link| RedisMappingCache::with_prefix(link, cli.redis_prefix.clone()))
            .ok_or(StartupError::MissingRedisUrl("the cache backend uses redis"))
    };

    let cache: Arc<dyn MappingCache> = match cli.cache {
        CacheBackendArg::Local => Arc::new(local()),
        CacheBackendArg::Redis => Arc::new(distributed()?),
        CacheBackendArg::Layered => Arc::new(LayeredCache::new(local(), distributed()?)),
    };
    Ok(cache)
}

pub async fn repository(cli: &Cli) -> Result<Arc<dyn ReadRepository>, StartupError> {
    match cli.storage {
        StorageBackendArg::InMemory => {
            warn!("Using the in-memory store; every identifier resolves to not found until seeded");
            Ok(Arc::new(InMemoryRepository::new()))
        }
        StorageBackendArg::Mysql => {
            let dsn = cli
                .mysql_dsn
                .as_deref()
                .ok_or(StartupError::MissingMysqlDsn)?;
            Ok(Arc::new(MySqlRepository::connect(dsn).await?))
        }
    }
}

pub fn stats(cli: &Cli, link: Option<&RedisLink>) -> Result<StatsRecorder, StartupError> {
    let sink: Arc<dyn StatsSink> = match cli.stats {
        StatsBackendArg::Tracing => Arc::new(TracingStatsSink),
        StatsBackendArg::Noop => Arc::new(NoopStatsSink),
        StatsBackendArg::Redis => {
            let link = link
                .cloned()
                .ok_or(StartupError::MissingRedisUrl("stats are recorded in redis"))?;
            Arc::new(RedisStatsSink::new(link))
        }
    };
    Ok(StatsRecorder::new(sink))
}

pub fn policy(cli: &Cli) -> AccessPolicy {
    let signer = cli
        .cookie_secret
        .as_deref()
        .filter(|secret| !secret.is_empty())
        .map(|secret| VerificationSigner::new(secret.as_bytes()));
    if signer.is_none() {
        warn!("No cookie secret configured; password verification cookies will never validate");
    }
    AccessPolicy::new(signer)
}

pub fn proxy(cli: &Cli) -> Result<ProxyFetcher, StartupError> {
    let config = ProxyConfig::builder()
        .attempt_timeout(Duration::from_millis(cli.proxy_timeout_ms))
        .max_retries(cli.proxy_retries)
        .build();
    Ok(ProxyFetcher::new(config)?)
}

pub fn router_config(cli: &Cli) -> RouterConfig {
    RouterConfig::builder()
        .serve_mode(cli.serve_mode)
        .cache_ttl(Duration::from_secs(cli.cache_ttl_secs))
        .preview_base(cli.preview_base.trim_end_matches('/'))
        .not_found_prefix(cli.not_found_prefix.clone())
        .build()
}

pub async fn build_state(cli: &Cli) -> Result<AppState, StartupError> {
    let link = redis_link(cli)?;

    let router = ImageRouter::new(
        cache(cli, link.as_ref())?,
        ResourceResolver::new(repository(cli).await?),
        policy(cli),
        proxy(cli)?,
        stats(cli, link.as_ref())?,
        router_config(cli),
    );

    info!(
        cache = router.cache().name(),
        storage = %cli.storage,
        stats = %cli.stats,
        serve_mode = %cli.serve_mode,
        "Router assembled"
    );

    let state = AppState::new(router);
    Ok(match link {
        Some(link) if cli.cache.needs_redis() => state.with_redis(link),
        _ => state,
    })
}
