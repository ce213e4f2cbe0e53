use parking_lot::RwLock;
use rand::Rng;
use redis::aio::MultiplexedConnection;
use shutter_core::CacheError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, trace, warn};
use typed_builder::TypedBuilder;

/// Type alias for cache results.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Capped, jittered reconnect schedule for the distributed tier.
///
/// After the `n`-th consecutive failure the next attempt is deferred by
/// `min(n * step, max_delay) + rand(0..=max_jitter)`. Once `max_retries`
/// consecutive attempts have failed the link waits `cooldown` before a fresh
/// series starts.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ReconnectPolicy {
    #[builder(default = 10)]
    pub max_retries: u32,
    #[builder(default = Duration::from_millis(100))]
    pub step: Duration,
    #[builder(default = Duration::from_secs(3))]
    pub max_delay: Duration,
    #[builder(default = Duration::from_millis(200))]
    pub max_jitter: Duration,
    #[builder(default = Duration::from_secs(30))]
    pub cooldown: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ReconnectPolicy {
    /// Delay before the next attempt, without jitter.
    pub fn base_delay(&self, failures: u32) -> Duration {
        if failures > self.max_retries {
            return self.cooldown;
        }
        self.step.saturating_mul(failures).min(self.max_delay)
    }

    /// Delay before the next attempt, with jitter.
    pub fn delay(&self, failures: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.base_delay(failures) + Duration::from_millis(jitter)
    }
}

/// Settings for a [`RedisLink`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct LinkConfig {
    /// Upper bound for a single command round-trip.
    #[builder(default = Duration::from_millis(250))]
    pub op_timeout: Duration,
    /// Upper bound for establishing a connection.
    #[builder(default = Duration::from_secs(1))]
    pub connect_timeout: Duration,
    #[builder(default)]
    pub reconnect: ReconnectPolicy,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Default)]
struct ReconnectState {
    failures: u32,
    retry_at: Option<Instant>,
}

#[derive(Debug)]
struct LinkInner {
    client: redis::Client,
    config: LinkConfig,
    connection: RwLock<Option<MultiplexedConnection>>,
    reconnect: Mutex<ReconnectState>,
}

/// A lazily connected, shared Redis connection.
///
/// Created once at startup and cloned into every component that talks to
/// Redis. The first command opens the connection; transport failures drop
/// it and later commands reconnect on the [`ReconnectPolicy`] schedule. Only
/// one caller reconnects at a time: the others fail fast with
/// [`CacheError::Unavailable`] instead of queueing behind it.
#[derive(Debug, Clone)]
pub struct RedisLink {
    inner: Arc<LinkInner>,
}

fn map_redis_error(operation: &str, err: redis::RedisError) -> CacheError {
    let message = format!("{operation}: {err}");
    if err.is_timeout() || message.to_ascii_lowercase().contains("timed out") {
        CacheError::Timeout(message)
    } else if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
        CacheError::Unavailable(message)
    } else {
        CacheError::Operation(message)
    }
}

impl RedisLink {
    /// Prepares a link to `url`. No network I/O happens until first use.
    pub fn open(url: &str, config: LinkConfig) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| CacheError::Initialization(format!("invalid Redis url: {e}")))?;

        Ok(Self {
            inner: Arc::new(LinkInner {
                client,
                config,
                connection: RwLock::new(None),
                reconnect: Mutex::new(ReconnectState::default()),
            }),
        })
    }

    /// Runs one command against the shared connection with the configured
    /// timeout. Transport failures invalidate the connection.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, command: F) -> Result<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let conn = self.connection().await?;
        let op_timeout = self.inner.config.op_timeout;

        match tokio::time::timeout(op_timeout, command(conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let err = map_redis_error(operation, e);
                if !matches!(err, CacheError::Operation(_)) {
                    self.invalidate();
                }
                Err(err)
            }
            Err(_) => {
                self.invalidate();
                Err(CacheError::Timeout(format!(
                    "{operation}: no reply within {op_timeout:?}"
                )))
            }
        }
    }

    /// Round-trips a `PING`. Never fails; returns reachability.
    pub async fn ping(&self) -> bool {
        let reply = self
            .run("ping", |mut conn| async move {
                redis::cmd("PING").query_async::<String>(&mut conn).await
            })
            .await;

        match reply {
            Ok(pong) => pong.eq_ignore_ascii_case("PONG"),
            Err(e) => {
                warn!(error = %e, "Redis ping failed");
                false
            }
        }
    }

    fn invalidate(&self) {
        if self.inner.connection.write().take().is_some() {
            warn!("Dropped Redis connection after transport failure");
        }
    }

    fn current(&self) -> Option<MultiplexedConnection> {
        self.inner.connection.read().clone()
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        if let Some(conn) = self.current() {
            return Ok(conn);
        }

        let Ok(mut state) = self.inner.reconnect.try_lock() else {
            return Err(CacheError::Unavailable(
                "Redis reconnect already in progress".to_string(),
            ));
        };

        // Another caller may have finished connecting in the meantime.
        if let Some(conn) = self.current() {
            return Ok(conn);
        }

        let now = Instant::now();
        if let Some(retry_at) = state.retry_at {
            if now < retry_at {
                return Err(CacheError::Unavailable(format!(
                    "Redis reconnect backing off for another {:?}",
                    retry_at - now
                )));
            }
        }

        trace!(failures = state.failures, "Connecting to Redis");
        let connect_timeout = self.inner.config.connect_timeout;
        let attempt = tokio::time::timeout(
            connect_timeout,
            self.inner.client.get_multiplexed_async_connection(),
        )
        .await;

        match attempt {
            Ok(Ok(conn)) => {
                if state.failures > 0 {
                    info!(failures = state.failures, "Redis connection re-established");
                } else {
                    info!("Redis connection established");
                }
                *state = ReconnectState::default();
                *self.inner.connection.write() = Some(conn.clone());
                Ok(conn)
            }
            Ok(Err(e)) => {
                self.schedule_retry(&mut state, now);
                Err(map_redis_error("failed to connect to Redis", e))
            }
            Err(_) => {
                self.schedule_retry(&mut state, now);
                Err(CacheError::Timeout(format!(
                    "failed to connect to Redis within {connect_timeout:?}"
                )))
            }
        }
    }

    fn schedule_retry(&self, state: &mut ReconnectState, now: Instant) {
        let policy = &self.inner.config.reconnect;
        state.failures = state.failures.saturating_add(1);
        let delay = policy.delay(state.failures);
        state.retry_at = Some(now + delay);

        if state.failures > policy.max_retries {
            warn!(
                failures = state.failures,
                cooldown = ?delay,
                "Redis reconnect retries exhausted, cooling down"
            );
            state.failures = 0;
        } else {
            warn!(failures = state.failures, retry_in = ?delay, "Redis connect failed");
        }
    }
}
