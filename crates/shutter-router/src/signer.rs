use hmac::{Hmac, Mac};
use jiff::{SignedDuration, Timestamp};
use sha2::Sha256;
use shutter_core::Identifier;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const COOKIE_PREFIX: &str = "shutter_verified_";

/// Signs and checks the per-identifier "password verified" cookie.
///
/// Value format: `{expiry_epoch}.{hex(HMAC-SHA256(secret, "{id}|{password_hash}|{expiry_epoch}"))}`.
/// The password hash is part of the MAC, so changing a password invalidates
/// every cookie issued for the old one.
#[derive(Clone)]
pub struct VerificationSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for VerificationSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationSigner")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A freshly issued verification cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCookie {
    pub name: String,
    pub value: String,
    pub expires_at: Timestamp,
}

impl VerificationCookie {
    /// Renders a `Set-Cookie` header value scoped to `path`.
    pub fn to_header_value(&self, path: &str, now: Timestamp) -> String {
        let max_age = self.expires_at.duration_since(now).as_secs().max(0);
        format!(
            "{}={}; Path={}; Max-Age={}; HttpOnly; Secure; SameSite=Lax",
            self.name, self.value, path, max_age
        )
    }
}

impl VerificationSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn cookie_name(id: &Identifier) -> String {
        format!("{COOKIE_PREFIX}{id}")
    }

    /// Issues a cookie valid for `ttl` from `now`. Called by the preview
    /// gate after the visitor enters the right password.
    pub fn issue(
        &self,
        id: &Identifier,
        password_hash: &str,
        ttl: Duration,
        now: Timestamp,
    ) -> Option<VerificationCookie> {
        let ttl = SignedDuration::try_from(ttl).ok()?;
        let expires_at = now.checked_add(ttl).ok()?;
        let expiry = expires_at.as_second();

        let mac = self.mac(id, password_hash, expiry)?;
        let signature = hex::encode(mac.finalize().into_bytes());

        Some(VerificationCookie {
            name: Self::cookie_name(id),
            value: format!("{expiry}.{signature}"),
            expires_at,
        })
    }

    /// Checks a cookie value. Expired, malformed, or forged values fail.
    pub fn verify(&self, id: &Identifier, password_hash: &str, value: &str, now: Timestamp) -> bool {
        let Some((expiry, signature)) = value.split_once('.') else {
            return false;
        };
        let Ok(expiry) = expiry.parse::<i64>() else {
            return false;
        };
        if now.as_second() >= expiry {
            return false;
        }
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };

        self.mac(id, password_hash, expiry)
            .is_some_and(|mac| mac.verify_slice(&signature).is_ok())
    }

    fn mac(&self, id: &Identifier, password_hash: &str, expiry: i64) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(format!("{id}|{password_hash}|{expiry}").as_bytes());
        Some(mac)
    }
}
