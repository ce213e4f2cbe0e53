//! Upstream fetch with bounded retries and a placeholder fallback.

use http::header::{
    HeaderName, ACCEPT_RANGES, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG,
    LAST_MODIFIED,
};
use http::{HeaderMap, HeaderValue, StatusCode};
use jiff::Timestamp;
use rand::Rng;
use shutter_core::ImageMapping;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use typed_builder::TypedBuilder;

use crate::response::{Placeholder, Served, UpstreamResponse};

const ONE_YEAR_SECS: u64 = 31_536_000;

const PROPAGATED: [HeaderName; 6] = [
    CONTENT_TYPE,
    CONTENT_LENGTH,
    ACCEPT_RANGES,
    CONTENT_RANGE,
    ETAG,
    LAST_MODIFIED,
];

#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("upstream answered {0}")]
    Status(StatusCode),
    #[error("upstream transport error: {0}")]
    Transport(String),
    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),
}

impl UpstreamError {
    /// Only server errors and network failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            UpstreamError::Status(status) => status.is_server_error(),
            UpstreamError::Transport(_) | UpstreamError::Timeout(_) => true,
        }
    }

    /// Status of the placeholder served for this failure.
    pub fn placeholder_status(&self) -> StatusCode {
        match self {
            UpstreamError::Status(StatusCode::NOT_FOUND | StatusCode::GONE) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct ProxyConfig {
    /// Upper bound for one attempt to receive response headers.
    #[builder(default = Duration::from_secs(8))]
    pub attempt_timeout: Duration,
    #[builder(default = Duration::from_secs(3))]
    pub connect_timeout: Duration,
    /// Retries after the first attempt.
    #[builder(default = 2)]
    pub max_retries: u32,
    /// Linear backoff step: the n-th retry waits `n * backoff_step` plus jitter.
    #[builder(default = Duration::from_millis(300))]
    pub backoff_step: Duration,
    #[builder(default = Duration::from_millis(200))]
    pub max_jitter: Duration,
    #[builder(default = concat!("shutter/", env!("CARGO_PKG_VERSION")).to_string(), setter(into))]
    pub user_agent: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ProxyConfig {
    pub fn backoff(&self, retry: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.backoff_step.saturating_mul(retry) + Duration::from_millis(jitter)
    }
}

/// `Cache-Control` for a successfully proxied image.
///
/// Effectively permanent mappings are cached for a year as immutable;
/// time-boxed ones never outlive their expiry. Protected images stay out of
/// shared caches.
pub fn cache_control(mapping: &ImageMapping, now: Timestamp) -> String {
    let scope = if mapping.is_password_protected() {
        "private"
    } else {
        "public"
    };

    if mapping.is_effectively_permanent(now) {
        return format!("{scope}, max-age={ONE_YEAR_SECS}, immutable");
    }

    let remaining = mapping
        .remaining_lifetime(now)
        .map(|d| d.as_secs())
        .unwrap_or(ONE_YEAR_SECS);
    format!("{scope}, max-age={remaining}")
}

/// Fetches images from their origin on behalf of the client.
#[derive(Debug, Clone)]
pub struct ProxyFetcher {
    client: reqwest::Client,
    config: ProxyConfig,
}

impl ProxyFetcher {
    pub fn new(config: ProxyConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| UpstreamError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Fetches `url`, retrying 5xx and network failures up to
    /// `max_retries` times. 4xx answers are returned immediately.
    pub async fn fetch(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<reqwest::Response, UpstreamError> {
        let mut retry = 0;

        loop {
            match self.attempt(url, headers).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && retry < self.config.max_retries => {
                    retry += 1;
                    let delay = self.config.backoff(retry);
                    warn!(
                        retry,
                        max_retries = self.config.max_retries,
                        delay = ?delay,
                        error = %e,
                        "Upstream fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Executes a proxy plan for `mapping`. Failures become a placeholder.
    pub async fn serve(
        &self,
        url: &str,
        headers: &HeaderMap,
        mapping: &ImageMapping,
        now: Timestamp,
    ) -> Served {
        match self.fetch(url, headers).await {
            Ok(response) => {
                let status = response.status();
                let mut out = HeaderMap::new();
                for name in PROPAGATED {
                    if let Some(value) = response.headers().get(&name) {
                        out.insert(name, value.clone());
                    }
                }
                if let Ok(value) = HeaderValue::from_str(&cache_control(mapping, now)) {
                    out.insert(CACHE_CONTROL, value);
                }

                debug!(id = %mapping.id, status = %status, "Proxying upstream response");
                Served::Upstream(UpstreamResponse::new(status, out, response))
            }
            Err(e) => {
                warn!(id = %mapping.id, error = %e, "Upstream unavailable, serving placeholder");
                Served::Placeholder(Placeholder::new(e.placeholder_status()))
            }
        }
    }

    async fn attempt(
        &self,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<reqwest::Response, UpstreamError> {
        let request = self.client.get(url).headers(headers.clone()).send();

        match tokio::time::timeout(self.config.attempt_timeout, request).await {
            Err(_) => Err(UpstreamError::Timeout(self.config.attempt_timeout)),
            Ok(Err(e)) if e.is_timeout() => Err(UpstreamError::Timeout(self.config.attempt_timeout)),
            Ok(Err(e)) => Err(UpstreamError::Transport(e.to_string())),
            Ok(Ok(response)) if response.status().is_success() => Ok(response),
            Ok(Ok(response)) => Err(UpstreamError::Status(response.status())),
        }
    }
}
