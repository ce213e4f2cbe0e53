//! Request classification from `Accept` and `User-Agent`.

use http::header::{ACCEPT, USER_AGENT};
use http::HeaderMap;
use serde::Serialize;

const BROWSER_TOKENS: &[&str] = &["mozilla", "chrome", "safari", "firefox", "edge", "opera"];

const TOOL_TOKENS: &[&str] = &[
    "curl",
    "wget",
    "python-requests",
    "httpie",
    "postman",
    "axios",
    "node-fetch",
    "go-http-client",
    "okhttp",
    "insomnia",
];

const CRAWLER_MARKERS: &[&str] = &["bot", "crawler", "spider", "slurp"];

/// Crawlers that render link previews the way a browser would. They report
/// as [`ClientType::Browser`] but do not set the browser flag on their own.
const TRUSTED_CRAWLERS: &[&str] = &[
    "googlebot",
    "bingbot",
    "twitterbot",
    "facebookexternalhit",
    "linkedinbot",
    "slackbot",
    "discordbot",
    "telegrambot",
    "whatsapp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Browser,
    Api,
    Crawler,
    Unknown,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Browser => "browser",
            ClientType::Api => "api",
            ClientType::Crawler => "crawler",
            ClientType::Unknown => "unknown",
        }
    }
}

/// What kind of client sent a request, as far as headers can tell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub is_browser_request: bool,
    pub is_image_request: bool,
    pub is_api_request: bool,
    pub has_extension: bool,
    pub client_type: ClientType,
    pub preferred_content_type: Option<String>,
}

/// Classifies a request from its headers.
pub fn classify(headers: &HeaderMap, has_extension: bool) -> Classification {
    let accept = header_str(headers, ACCEPT);
    let user_agent = header_str(headers, USER_AGENT);
    classify_raw(accept, user_agent, has_extension)
}

/// Classifies a request from raw `Accept` and `User-Agent` values.
///
/// Matching is case-insensitive. Missing headers count as empty.
pub fn classify_raw(accept: &str, user_agent: &str, has_extension: bool) -> Classification {
    let accept = accept.trim().to_ascii_lowercase();
    let ua = user_agent.to_ascii_lowercase();

    let browser_ua = contains_any(&ua, BROWSER_TOKENS);
    let tool_ua = contains_any(&ua, TOOL_TOKENS);
    let trusted_crawler = contains_any(&ua, TRUSTED_CRAWLERS);
    let crawler_ua = trusted_crawler || contains_any(&ua, CRAWLER_MARKERS);

    // Only tool tokens disqualify a browser user agent; bots carrying a
    // browser token still get the preview page.
    let is_browser_request = accept.contains("text/html") || (browser_ua && !tool_ua);

    let wildcard = accept.is_empty() || accept == "*/*";
    let is_image_request = !is_browser_request && (accept.contains("image/") || wildcard);

    let is_api_request = accept.contains("application/json") || tool_ua;

    let client_type = if is_browser_request || trusted_crawler {
        ClientType::Browser
    } else if is_api_request {
        ClientType::Api
    } else if crawler_ua {
        ClientType::Crawler
    } else {
        ClientType::Unknown
    };

    Classification {
        is_browser_request,
        is_image_request,
        is_api_request,
        has_extension,
        client_type,
        preferred_content_type: preferred_image_type(&accept),
    }
}

fn header_str(headers: &HeaderMap, name: http::header::HeaderName) -> &str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// First `image/*` media range in a lower-cased `Accept` value, parameters
/// stripped.
fn preferred_image_type(accept: &str) -> Option<String> {
    accept
        .split(',')
        .map(|range| range.split(';').next().unwrap_or_default().trim())
        .find(|media| media.starts_with("image/"))
        .map(str::to_string)
}
