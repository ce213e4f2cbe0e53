//! Best-effort access statistics.

use async_trait::async_trait;
use jiff::Timestamp;
use serde::Serialize;
use shutter_cache::RedisLink;
use shutter_core::Identifier;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, trace, warn};

use crate::classifier::ClientType;

#[derive(Debug, Clone, Error)]
pub enum StatsError {
    #[error("stats backend error: {0}")]
    Backend(String),
    #[error("stats backend did not answer within {0:?}")]
    Timeout(Duration),
}

/// How an access was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    /// Sent to the interactive preview gate.
    Preview,
    /// Redirected to the origin.
    Direct,
    /// Streamed through the proxy.
    Proxy,
    Metadata,
    Denied,
    Expired,
    NotFound,
    /// Upstream failed; a placeholder was served.
    Failed,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Preview => "preview",
            AccessType::Direct => "direct",
            AccessType::Proxy => "proxy",
            AccessType::Metadata => "metadata",
            AccessType::Denied => "denied",
            AccessType::Expired => "expired",
            AccessType::NotFound => "not_found",
            AccessType::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEvent {
    pub id: Identifier,
    pub client_type: ClientType,
    pub access_type: AccessType,
    pub referer: Option<String>,
    pub client_ip: Option<String>,
    pub at: Timestamp,
}

/// Receives access events. Delivery is best effort.
#[async_trait]
pub trait StatsSink: Send + Sync + 'static {
    async fn record(&self, event: &AccessEvent) -> Result<(), StatsError>;
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStatsSink;

#[async_trait]
impl StatsSink for NoopStatsSink {
    async fn record(&self, _event: &AccessEvent) -> Result<(), StatsError> {
        Ok(())
    }
}

/// Emits one structured log line per access.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatsSink;

#[async_trait]
impl StatsSink for TracingStatsSink {
    async fn record(&self, event: &AccessEvent) -> Result<(), StatsError> {
        info!(
            target: "shutter::access",
            id = %event.id,
            client_type = event.client_type.as_str(),
            access_type = event.access_type.as_str(),
            referer = event.referer.as_deref().unwrap_or("-"),
            client_ip = event.client_ip.as_deref().unwrap_or("-"),
            "image accessed"
        );
        Ok(())
    }
}

/// Per-identifier counters in a Redis hash.
///
/// `{prefix}{id}` holds one field per access type, a `total`, and
/// `last_access` (Unix seconds).
#[derive(Debug, Clone)]
pub struct RedisStatsSink {
    link: RedisLink,
    key_prefix: String,
}

impl RedisStatsSink {
    pub fn new(link: RedisLink) -> Self {
        Self::with_prefix(link, "shutter:stats:")
    }

    pub fn with_prefix(link: RedisLink, key_prefix: impl Into<String>) -> Self {
        Self {
            link,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn key(&self, id: &Identifier) -> String {
        format!("{}{}", self.key_prefix, id.as_str())
    }
}

#[async_trait]
impl StatsSink for RedisStatsSink {
    async fn record(&self, event: &AccessEvent) -> Result<(), StatsError> {
        let key = self.key(&event.id);
        let field = event.access_type.as_str();
        let at = event.at.as_second();

        self.link
            .run("failed to record access stats", move |mut conn| async move {
                let mut pipe = redis::pipe();
                pipe.hincr(&key, field, 1)
                    .ignore()
                    .hincr(&key, "total", 1)
                    .ignore()
                    .hset(&key, "last_access", at)
                    .ignore();
                pipe.query_async::<()>(&mut conn).await
            })
            .await
            .map_err(|e| StatsError::Backend(e.to_string()))
    }
}

/// Hands events to a [`StatsSink`] on a detached task.
///
/// Each record runs under its own timeout; failures are logged and never
/// reach the caller.
#[derive(Clone)]
pub struct StatsRecorder {
    sink: Arc<dyn StatsSink>,
    timeout: Duration,
}

impl std::fmt::Debug for StatsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsRecorder")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Default for StatsRecorder {
    fn default() -> Self {
        Self::new(Arc::new(NoopStatsSink))
    }
}

impl StatsRecorder {
    pub fn new(sink: Arc<dyn StatsSink>) -> Self {
        Self {
            sink,
            timeout: Duration::from_secs(1),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Records `event` in the background and returns immediately.
    pub fn record(&self, event: AccessEvent) -> tokio::task::JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        let timeout = self.timeout;

        tokio::spawn(async move {
            trace!(id = %event.id, access_type = event.access_type.as_str(), "Recording access");
            let outcome = match tokio::time::timeout(timeout, sink.record(&event)).await {
                Ok(result) => result,
                Err(_) => Err(StatsError::Timeout(timeout)),
            };
            if let Err(e) = outcome {
                warn!(id = %event.id, error = %e, "Failed to record access stats");
            }
        })
    }
}
