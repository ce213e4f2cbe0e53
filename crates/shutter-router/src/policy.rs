//! Expiry and password rules.

use http::header::{COOKIE, REFERER};
use http::HeaderMap;
use jiff::Timestamp;
use shutter_core::{Identifier, ImageMapping};
use tracing::debug;

use crate::classifier::Classification;
use crate::planner::ResponsePlan;
use crate::signer::VerificationSigner;

const PROTECTED_MESSAGE: &str = "This image is password protected";
const UNVERIFIED_MESSAGE: &str = "Password verification required";

/// Outcome of the password check for a plan that would serve content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordDecision {
    Allow,
    RedirectToGate,
    Forbidden(&'static str),
}

/// Evaluates expiry and password gating for one mapping.
///
/// Without a signer no cookie ever verifies, so protected images are only
/// reachable through the preview gate.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    signer: Option<VerificationSigner>,
}

impl AccessPolicy {
    pub fn new(signer: Option<VerificationSigner>) -> Self {
        Self { signer }
    }

    pub fn signer(&self) -> Option<&VerificationSigner> {
        self.signer.as_ref()
    }

    /// Returns the 410 plan when the mapping's business expiry has passed.
    pub fn check_expiry(&self, mapping: &ImageMapping, now: Timestamp) -> Option<ResponsePlan> {
        match mapping.expires_at {
            Some(expires_at) if mapping.is_expired(now) => {
                debug!(id = %mapping.id, expires_at = %expires_at, "Mapping expired");
                Some(ResponsePlan::expired(expires_at))
            }
            _ => None,
        }
    }

    /// Decides whether a protected mapping may be served inline.
    pub fn check_password(
        &self,
        mapping: &ImageMapping,
        classification: &Classification,
        headers: &HeaderMap,
        now: Timestamp,
    ) -> PasswordDecision {
        let Some(password_hash) = mapping.password.as_deref().filter(|p| !p.is_empty()) else {
            return PasswordDecision::Allow;
        };

        // An <img> tag cannot complete an interactive challenge.
        if classification.is_image_request {
            return PasswordDecision::Forbidden(PROTECTED_MESSAGE);
        }

        if self.has_valid_cookie(&mapping.id, password_hash, headers, now) {
            return PasswordDecision::Allow;
        }

        if !classification.is_browser_request {
            return PasswordDecision::Forbidden(PROTECTED_MESSAGE);
        }

        if came_from_gate(headers, &mapping.id) {
            PasswordDecision::Forbidden(UNVERIFIED_MESSAGE)
        } else {
            PasswordDecision::RedirectToGate
        }
    }

    /// Applies the password rules to `plan`. Plans that do not serve
    /// content pass through untouched.
    pub fn gate(
        &self,
        plan: ResponsePlan,
        mapping: &ImageMapping,
        classification: &Classification,
        headers: &HeaderMap,
        preview_location: &str,
        now: Timestamp,
    ) -> ResponsePlan {
        if !plan.serves_content(mapping) {
            return plan;
        }

        match self.check_password(mapping, classification, headers, now) {
            PasswordDecision::Allow => plan,
            PasswordDecision::RedirectToGate => ResponsePlan::redirect(preview_location),
            PasswordDecision::Forbidden(message) => ResponsePlan::forbidden(message),
        }
    }

    fn has_valid_cookie(
        &self,
        id: &Identifier,
        password_hash: &str,
        headers: &HeaderMap,
        now: Timestamp,
    ) -> bool {
        let Some(signer) = &self.signer else {
            return false;
        };
        let name = VerificationSigner::cookie_name(id);
        cookie_value(headers, &name).is_some_and(|value| signer.verify(id, password_hash, value, now))
    }
}

/// Finds a cookie by name across every `Cookie` header.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"'))
}

/// Whether the referer is this identifier's preview gate.
fn came_from_gate(headers: &HeaderMap, id: &Identifier) -> bool {
    let Some(referer) = headers.get(REFERER).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let path = referer
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    path.ends_with(&id.preview_path())
}
