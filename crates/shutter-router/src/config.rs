use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use typed_builder::TypedBuilder;

/// How the "serve the underlying image" rows of the decision table are
/// carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServeMode {
    /// Fetch the image server-side and stream it back, hiding the origin.
    #[default]
    Proxy,
    /// Answer with a 302 to the origin URL.
    Redirect,
}

impl Display for ServeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServeMode::Proxy => f.write_str("proxy"),
            ServeMode::Redirect => f.write_str("redirect"),
        }
    }
}

impl FromStr for ServeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "proxy" => Ok(ServeMode::Proxy),
            "redirect" => Ok(ServeMode::Redirect),
            other => Err(format!("unknown serve mode '{other}', expected proxy or redirect")),
        }
    }
}

/// Settings for [`ImageRouter`](crate::ImageRouter).
#[derive(Debug, Clone, TypedBuilder)]
pub struct RouterConfig {
    #[builder(default)]
    pub serve_mode: ServeMode,
    /// Cache-tier TTL for mappings populated after a miss. Always clamped to
    /// the mapping's own expiry.
    #[builder(default = Duration::from_secs(3600))]
    pub cache_ttl: Duration,
    /// Prepended to `/{id}/p` to form the preview gate location.
    #[builder(default, setter(into))]
    pub preview_base: String,
    /// Unknown identifiers redirect to `{not_found_prefix}/{raw}`.
    #[builder(default, setter(into))]
    pub not_found_prefix: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
