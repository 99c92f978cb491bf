//! Release configuration.
//!
//! Loaded from a TOML file; every section is optional and falls back to the
//! built-in defaults. Command-line flags override file values afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::catalog::Catalog;
use crate::domain::error::{Result, ShipitError};

/// What the importer does when listing a repository's tags fails.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryFailurePolicy {
    /// Treat the tag as missing and import anyway.
    #[default]
    AssumeMissing,

    /// Fail the catalog entry without importing.
    Fail,
}

/// Where releases go.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    /// Registry address, e.g. `myacr.azurecr.io`.
    pub registry: String,

    /// Cluster namespace hosting the application.
    pub namespace: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            registry: String::new(),
            namespace: "pets".to_string(),
        }
    }
}

/// Failure handling and pacing of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ReleasePolicy {
    pub on_query_failure: QueryFailurePolicy,

    /// Failed imports are reported but do not fail the run.
    pub tolerate_import_failures: bool,

    /// List the registry after each build to confirm both tags exist.
    pub verify_published_tags: bool,

    /// Maximum catalog entries imported or built concurrently.
    pub max_parallel: usize,

    /// Readiness wait per workload.
    pub rollout_timeout_secs: u64,

    /// Upper bound for any single external command.
    pub command_timeout_secs: u64,
}

impl Default for ReleasePolicy {
    fn default() -> Self {
        Self {
            on_query_failure: QueryFailurePolicy::AssumeMissing,
            tolerate_import_failures: false,
            verify_published_tags: true,
            max_parallel: 1,
            rollout_timeout_secs: 300,
            command_timeout_secs: 1800,
        }
    }
}

impl ReleasePolicy {
    pub fn rollout_timeout(&self) -> Duration {
        Duration::from_secs(self.rollout_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

/// Manifests applied on first-time deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ManifestConfig {
    pub paths: Vec<PathBuf>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            paths: vec![PathBuf::from("aks-store-all-in-one.yaml")],
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ShipitConfig {
    pub target: TargetConfig,
    pub policy: ReleasePolicy,
    pub manifests: ManifestConfig,
    pub catalog: Catalog,
}

impl ShipitConfig {
    /// Read and parse a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Check the configuration is complete enough to run a release.
    pub fn validate(&self) -> Result<()> {
        if self.target.registry.trim().is_empty() {
            return Err(ShipitError::InvalidConfig(
                "target registry must be set (config [target].registry or --registry)".to_string(),
            ));
        }
        if self.target.namespace.trim().is_empty() {
            return Err(ShipitError::InvalidConfig(
                "target namespace must not be empty".to_string(),
            ));
        }
        if self.policy.max_parallel == 0 {
            return Err(ShipitError::InvalidConfig(
                "policy.max_parallel must be at least 1".to_string(),
            ));
        }
        if self.policy.rollout_timeout_secs == 0 {
            return Err(ShipitError::InvalidConfig(
                "policy.rollout_timeout_secs must be positive".to_string(),
            ));
        }
        self.catalog.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ShipitConfig::default();
        assert_eq!(config.target.namespace, "pets");
        assert_eq!(config.policy.on_query_failure, QueryFailurePolicy::AssumeMissing);
        assert!(config.policy.verify_published_tags);
        assert_eq!(config.policy.max_parallel, 1);
        assert_eq!(config.catalog, Catalog::default());
    }

    #[test]
    fn test_default_needs_registry() {
        let err = ShipitConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("registry"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = ShipitConfig::from_toml_str(
            r#"
            [target]
            registry = "myacr.azurecr.io"

            [policy]
            on_query_failure = "fail"
            max_parallel = 4
            "#,
        )
        .expect("parse");

        assert_eq!(config.target.registry, "myacr.azurecr.io");
        assert_eq!(config.target.namespace, "pets");
        assert_eq!(config.policy.on_query_failure, QueryFailurePolicy::Fail);
        assert_eq!(config.policy.max_parallel, 4);
        assert_eq!(config.policy.rollout_timeout_secs, 300);
        config.validate().expect("valid");
    }

    #[test]
    fn test_catalog_override() {
        let config = ShipitConfig::from_toml_str(
            r#"
            [target]
            registry = "myacr.azurecr.io"

            [catalog]
            presence_probe = "web"

            [[catalog.build]]
            name = "web"
            build_context = "src/web"

            [catalog.workloads.web]
            kind = "deployment"
            name = "web"
            container = "web"
            "#,
        )
        .expect("parse");

        assert_eq!(config.catalog.build.len(), 1);
        assert_eq!(config.catalog.build[0].name, "web");
        // unspecified tables keep their defaults
        assert_eq!(config.catalog.seed.len(), 5);
        assert!(config.validate().is_err(), "seed images lost their workloads");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = ShipitConfig::from_toml_str("[policy]\nmax_paralel = 3\n").unwrap_err();
        assert!(err.to_string().contains("config parse error"));
    }

    #[test]
    fn test_zero_parallel_rejected() {
        let mut config = ShipitConfig::default();
        config.target.registry = "r.example.io".to_string();
        config.policy.max_parallel = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "[target]\nregistry = \"r.example.io\"\nnamespace = \"store\"").unwrap();
        let config = ShipitConfig::load(file.path()).expect("load");
        assert_eq!(config.target.namespace, "store");
    }
}
