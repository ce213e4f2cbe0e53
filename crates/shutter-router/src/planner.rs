//! The response decision table.
//!
//! | extension | classification        | plan                          |
//! |-----------|-----------------------|-------------------------------|
//! | yes       | browser               | redirect to `/{id}/p`         |
//! | yes       | anything else         | serve `mapping.url`           |
//! | no        | image request         | serve `mapping.url`           |
//! | no        | browser               | redirect to `/{id}/p`         |
//! | no        | api/crawler/unknown   | JSON metadata                 |
//!
//! Browser detection dominates extension presence.

use http::header::ACCEPT;
use http::{HeaderMap, HeaderValue, StatusCode};
use jiff::Timestamp;
use serde::Serialize;
use serde_json::Value;
use shutter_core::{Identifier, ImageMapping, RequestTarget};

use crate::classifier::Classification;
use crate::config::ServeMode;

/// User-visible failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Expired,
    Forbidden,
    UpstreamUnavailable,
    TransientCacheFailure,
}

impl ErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Expired => StatusCode::GONE,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            ErrorKind::TransientCacheFailure => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorBody {
    Text(String),
    Json(Value),
}

/// What the router will answer with.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePlan {
    Redirect {
        location: String,
        status: StatusCode,
    },
    /// Fetch `url` server-side, sending `headers` upstream.
    Proxy { url: String, headers: HeaderMap },
    Json { payload: Value, status: StatusCode },
    Error {
        kind: ErrorKind,
        status: StatusCode,
        body: ErrorBody,
    },
}

impl ResponsePlan {
    pub fn redirect(location: impl Into<String>) -> Self {
        ResponsePlan::Redirect {
            location: location.into(),
            status: StatusCode::FOUND,
        }
    }

    pub fn forbidden(message: &str) -> Self {
        ResponsePlan::Error {
            kind: ErrorKind::Forbidden,
            status: ErrorKind::Forbidden.status(),
            body: ErrorBody::Text(message.to_string()),
        }
    }

    /// 410 with `{error, message, expiresAt}`.
    pub fn expired(expires_at: Timestamp) -> Self {
        ResponsePlan::Error {
            kind: ErrorKind::Expired,
            status: ErrorKind::Expired.status(),
            body: ErrorBody::Json(serde_json::json!({
                "error": "expired",
                "message": format!("This image link expired on {expires_at}"),
                "expiresAt": expires_at,
            })),
        }
    }

    /// Redirect to the external not-found page for `raw`.
    pub fn not_found(prefix: &str, raw: &str) -> Self {
        Self::redirect(format!("{}/{}", prefix.trim_end_matches('/'), raw))
    }

    /// Whether executing this plan delivers the image bytes (or their
    /// location) to the client.
    pub fn serves_content(&self, mapping: &ImageMapping) -> bool {
        match self {
            ResponsePlan::Proxy { .. } => true,
            ResponsePlan::Redirect { location, .. } => *location == mapping.url,
            _ => false,
        }
    }
}

/// JSON view of a mapping for API clients and crawlers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingMetadata {
    pub id: Identifier,
    pub url: String,
    pub filename: String,
    pub extension: Option<String>,
    pub created_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub password_protected: bool,
}

impl From<&ImageMapping> for MappingMetadata {
    /// Protected mappings expose the short URL instead of the origin.
    fn from(mapping: &ImageMapping) -> Self {
        let password_protected = mapping.is_password_protected();
        let url = if password_protected {
            mapping.short_url.clone()
        } else {
            mapping.url.clone()
        };

        Self {
            id: mapping.id.clone(),
            url,
            filename: mapping.filename.clone(),
            extension: mapping.extension.clone(),
            created_at: mapping.created_at,
            expires_at: mapping.expires_at,
            password_protected,
        }
    }
}

/// Inputs the decision table depends on besides the request itself.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub serve_mode: ServeMode,
    pub preview_base: &'a str,
}

/// Picks a plan. Pure: identical inputs always give an identical plan.
pub fn plan(
    target: &RequestTarget,
    classification: &Classification,
    mapping: &ImageMapping,
    ctx: PlanContext<'_>,
) -> ResponsePlan {
    let preview = || {
        ResponsePlan::redirect(format!("{}{}", ctx.preview_base, mapping.id.preview_path()))
    };

    if target.has_extension() {
        if classification.is_browser_request {
            return preview();
        }
        return serve(mapping, classification, ctx.serve_mode);
    }

    if classification.is_image_request {
        serve(mapping, classification, ctx.serve_mode)
    } else if classification.is_browser_request {
        preview()
    } else {
        metadata(mapping)
    }
}

fn serve(mapping: &ImageMapping, classification: &Classification, mode: ServeMode) -> ResponsePlan {
    match mode {
        ServeMode::Redirect => ResponsePlan::redirect(mapping.url.clone()),
        ServeMode::Proxy => {
            let mut headers = HeaderMap::new();
            if let Some(value) = classification
                .preferred_content_type
                .as_deref()
                .and_then(|v| HeaderValue::from_str(v).ok())
            {
                headers.insert(ACCEPT, value);
            }
            ResponsePlan::Proxy {
                url: mapping.url.clone(),
                headers,
            }
        }
    }
}

fn metadata(mapping: &ImageMapping) -> ResponsePlan {
    let payload = serde_json::to_value(MappingMetadata::from(mapping)).unwrap_or(Value::Null);
    ResponsePlan::Json {
        payload,
        status: StatusCode::OK,
    }
}
