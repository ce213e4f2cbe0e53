use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A validated opaque identifier naming one image mapping.
///
/// Identifiers must be 3-64 characters long and contain only
/// alphanumeric characters, hyphens, or underscores.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

const MIN_LENGTH: usize = 3;
const MAX_LENGTH: usize = 64;
const MAX_EXTENSION_LENGTH: usize = 8;

impl Identifier {
    /// Creates a new `Identifier` after validating the input.
    pub fn new(code: impl Into<String>) -> std::result::Result<Self, CoreError> {
        let code = code.into();
        Self::validate(&code)?;
        Ok(Self(code))
    }

    /// Creates an `Identifier` without validation.
    ///
    /// Use this only for values produced by trusted internal sources
    /// (e.g. rows read back from the persistent store).
    pub fn new_unchecked(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path of the interactive preview gate for this identifier.
    pub fn preview_path(&self) -> String {
        format!("/{}/p", self.0)
    }

    fn validate(code: &str) -> std::result::Result<(), CoreError> {
        if code.len() < MIN_LENGTH || code.len() > MAX_LENGTH {
            return Err(CoreError::InvalidIdentifier(format!(
                "length must be between {} and {}, got {}",
                MIN_LENGTH,
                MAX_LENGTH,
                code.len()
            )));
        }

        if !code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::InvalidIdentifier(format!(
                "must contain only alphanumeric characters, hyphens, or underscores: '{}'",
                code
            )));
        }

        Ok(())
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identifier {
    type Error = CoreError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(value: Identifier) -> Self {
        value.0
    }
}

/// The raw path segment of an image request, split into identifier and
/// optional file extension.
///
/// `Ab12Cd3xyz9.png` parses to identifier `Ab12Cd3xyz9` with extension `png`.
/// A dot-suffix only counts as an extension when it is 1-8 ASCII
/// alphanumerics; anything else is left in the identifier and fails
/// validation there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestTarget {
    raw: String,
    id: Identifier,
    extension: Option<String>,
}

impl RequestTarget {
    /// Parses a raw path segment.
    pub fn parse(raw: impl Into<String>) -> std::result::Result<Self, CoreError> {
        let raw = raw.into();

        let (code, extension) = match raw.rsplit_once('.') {
            Some((code, ext)) if is_extension(ext) => (code, Some(ext.to_ascii_lowercase())),
            _ => (raw.as_str(), None),
        };

        let id = Identifier::new(code)?;
        Ok(Self {
            id,
            extension,
            raw,
        })
    }

    /// The path segment exactly as it was requested.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }

    /// Lower-cased extension, if the raw segment carried one.
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    pub fn has_extension(&self) -> bool {
        self.extension.is_some()
    }
}

fn is_extension(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= MAX_EXTENSION_LENGTH
        && candidate.chars().all(|c| c.is_ascii_alphanumeric())
}
