use bytes::Bytes;
use http::header::CACHE_CONTROL;
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::Value;

const PLACEHOLDER_SVG: &str = concat!(
    r##"<svg xmlns="http://www.w3.org/2000/svg" width="320" height="180" viewBox="0 0 320 180">"##,
    r##"<rect width="320" height="180" fill="#e5e7eb"/>"##,
    r##"<text x="160" y="96" font-family="sans-serif" font-size="16" fill="#6b7280" "##,
    r##"text-anchor="middle">Image unavailable</text></svg>"##,
);

/// The router's final answer, ready for the HTTP layer to render.
#[derive(Debug)]
pub enum Served {
    Redirect { location: String, status: StatusCode },
    Json { status: StatusCode, body: Value },
    Text { status: StatusCode, body: String },
    Upstream(UpstreamResponse),
    Placeholder(Placeholder),
}

impl Served {
    pub fn status(&self) -> StatusCode {
        match self {
            Served::Redirect { status, .. }
            | Served::Json { status, .. }
            | Served::Text { status, .. } => *status,
            Served::Upstream(upstream) => upstream.status(),
            Served::Placeholder(placeholder) => placeholder.status(),
        }
    }
}

/// A successful upstream response whose body has not been read yet.
#[derive(Debug)]
pub struct UpstreamResponse {
    status: StatusCode,
    headers: HeaderMap,
    response: reqwest::Response,
}

impl UpstreamResponse {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, response: reqwest::Response) -> Self {
        Self {
            status,
            headers,
            response,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Headers to send to the client: the propagated upstream subset plus
    /// `Cache-Control`.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, reqwest::Response) {
        (self.status, self.headers, self.response)
    }

    /// Buffers the whole body.
    pub async fn bytes(self) -> reqwest::Result<Bytes> {
        self.response.bytes().await
    }
}

/// A synthetic image returned instead of upstream failures.
///
/// Carries no detail about the origin or the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    status: StatusCode,
}

impl Placeholder {
    pub const CONTENT_TYPE: &'static str = "image/svg+xml";

    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> Bytes {
        Bytes::from_static(PLACEHOLDER_SVG.as_bytes())
    }

    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static(Self::CONTENT_TYPE),
        );
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers
    }
}
