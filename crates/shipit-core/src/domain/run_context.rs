//! Per-invocation run identity and target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::catalog::LATEST_TAG;
use crate::domain::error::{Result, ShipitError};

/// Maximum length of a registry tag.
const MAX_TAG_LEN: usize = 128;

/// Immutable tag that uniquely identifies one invocation's first-party build.
///
/// Must be a valid registry tag and must never equal the floating tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RunIdentifier(String);

impl RunIdentifier {
    /// Validate an externally supplied identifier (e.g. a CI build counter).
    pub fn parse(value: &str) -> Result<Self> {
        let invalid = |reason: &str| ShipitError::InvalidRunId {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        if value.is_empty() {
            return Err(invalid("must not be empty"));
        }
        if value.len() > MAX_TAG_LEN {
            return Err(invalid("longer than 128 characters"));
        }
        if value == LATEST_TAG {
            return Err(invalid("collides with the floating tag"));
        }
        let mut chars = value.chars();
        let first_ok = chars
            .next()
            .map(|c| c.is_ascii_alphanumeric() || c == '_')
            .unwrap_or(false);
        if !first_ok {
            return Err(invalid("must start with a letter, digit or underscore"));
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
            return Err(invalid("may only contain letters, digits, '_', '.' and '-'"));
        }

        Ok(Self(value.to_string()))
    }

    /// Generate an identifier for runs without an external build counter.
    pub fn generate() -> Self {
        Self::generate_at(Utc::now())
    }

    /// Timestamp plus a random suffix so concurrent runs never collide.
    pub fn generate_at(at: DateTime<Utc>) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", at.format("%Y%m%dT%H%M%S"), &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RunIdentifier {
    type Error = ShipitError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<RunIdentifier> for String {
    fn from(id: RunIdentifier) -> Self {
        id.0
    }
}

impl fmt::Display for RunIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a run needs to address its targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: RunIdentifier,

    /// Cluster namespace hosting the application.
    pub namespace: String,

    /// Registry address, e.g. `myacr.azurecr.io`.
    pub registry: String,
}

impl RunContext {
    pub fn new(run_id: RunIdentifier, namespace: &str, registry: &str) -> Self {
        Self {
            run_id,
            namespace: namespace.to_string(),
            registry: registry.trim_end_matches('/').to_string(),
        }
    }

    /// Fully qualified image reference inside the target registry.
    pub fn image_ref(&self, name: &str, tag: &str) -> String {
        format!("{}/{}:{}", self.registry, name, tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_counter() {
        let id = RunIdentifier::parse("1042").unwrap();
        assert_eq!(id.as_str(), "1042");
    }

    #[test]
    fn test_parse_rejects_latest() {
        assert!(RunIdentifier::parse("latest").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_chars() {
        assert!(RunIdentifier::parse("").is_err());
        assert!(RunIdentifier::parse("-leading-dash").is_err());
        assert!(RunIdentifier::parse("has space").is_err());
        assert!(RunIdentifier::parse("a/b").is_err());
        assert!(RunIdentifier::parse(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_generated_ids_are_valid_and_distinct() {
        let at = DateTime::parse_from_rfc3339("2026-10-19T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let a = RunIdentifier::generate_at(at);
        let b = RunIdentifier::generate_at(at);
        assert!(a.as_str().starts_with("20261019T120000-"));
        assert_ne!(a, b);
        assert!(RunIdentifier::parse(a.as_str()).is_ok());
    }

    #[test]
    fn test_serde_validates() {
        let ok: RunIdentifier = serde_json::from_str("\"build-7\"").unwrap();
        assert_eq!(ok.as_str(), "build-7");
        assert!(serde_json::from_str::<RunIdentifier>("\"latest\"").is_err());
    }

    #[test]
    fn test_image_ref() {
        let ctx = RunContext::new(
            RunIdentifier::parse("55").unwrap(),
            "pets",
            "myacr.azurecr.io/",
        );
        assert_eq!(
            ctx.image_ref("store-front", ctx.run_id.as_str()),
            "myacr.azurecr.io/store-front:55"
        );
    }
}
