use crate::identifier::Identifier;
use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Expiries further out than this are treated as permanent for caching.
pub const PERMANENT_HORIZON: SignedDuration = SignedDuration::from_hours(24 * 365);

/// A persisted record linking an identifier to the underlying image.
///
/// Mappings are created by the upload pipeline and are read-only from the
/// router's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMapping {
    /// The opaque short code. Never changes after creation.
    pub id: Identifier,
    /// Location of the underlying binary at the storage origin.
    pub url: String,
    /// Filename supplied at upload time.
    pub filename: String,
    /// File extension without the leading dot, if known.
    pub extension: Option<String>,
    pub created_at: Timestamp,
    /// Business-level expiry. `None` means the mapping never expires.
    pub expires_at: Option<Timestamp>,
    /// Pre-hashed password gating inline access.
    pub password: Option<String>,
    /// Canonical public short URL.
    pub short_url: String,
}

impl ImageMapping {
    /// Returns `true` once `now` has reached the business expiry.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    pub fn is_password_protected(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Time left until the business expiry, `None` for mappings that never
    /// expire. Already-expired mappings report zero.
    pub fn remaining_lifetime(&self, now: Timestamp) -> Option<Duration> {
        self.expires_at
            .map(|expires_at| non_negative(expires_at.duration_since(now)))
    }

    /// A mapping is effectively permanent when it has no expiry or its expiry
    /// lies beyond [`PERMANENT_HORIZON`].
    pub fn is_effectively_permanent(&self, now: Timestamp) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at.duration_since(now) > PERMANENT_HORIZON,
        }
    }
}

pub(crate) fn non_negative(span: SignedDuration) -> Duration {
    if span.is_negative() {
        Duration::ZERO
    } else {
        Duration::from_secs(span.as_secs() as u64)
    }
}
