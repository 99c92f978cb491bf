//! One-time application of the full manifest set.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::collaborators::Cluster;

/// Result of a manifest application.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub namespace: String,

    /// Whether this run created the namespace.
    pub namespace_created: bool,

    /// Manifests applied successfully, in order.
    pub applied: Vec<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApplyOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Applies workload manifests on first-time deployment.
pub struct ManifestApplier {
    cluster: Arc<dyn Cluster>,
}

impl ManifestApplier {
    pub fn new(cluster: Arc<dyn Cluster>) -> Self {
        Self { cluster }
    }

    /// Ensure `namespace` exists, then apply every manifest in order.
    ///
    /// Stops at the first manifest that fails; later manifests may depend on
    /// earlier ones.
    pub async fn apply_all(&self, manifests: &[PathBuf], namespace: &str) -> ApplyOutcome {
        let mut outcome = ApplyOutcome {
            namespace: namespace.to_string(),
            ..ApplyOutcome::default()
        };

        match self.ensure_namespace(namespace).await {
            Ok(created) => outcome.namespace_created = created,
            Err(error) => {
                outcome.error = Some(error);
                return outcome;
            }
        }

        if manifests.is_empty() {
            warn!(namespace = %namespace, "no manifests configured for first-time deployment");
        }

        for path in manifests {
            match self.cluster.apply_manifest(path, namespace).await {
                Ok(()) => {
                    info!(manifest = %path.display(), namespace = %namespace, "manifest applied");
                    outcome.applied.push(path.clone());
                }
                Err(e) => {
                    outcome.error = Some(format!("applying {}: {e}", path.display()));
                    break;
                }
            }
        }

        outcome
    }

    /// Create-if-absent. An "already exists" race is not an error.
    async fn ensure_namespace(&self, namespace: &str) -> Result<bool, String> {
        let exists = self
            .cluster
            .namespace_exists(namespace)
            .await
            .map_err(|e| format!("checking namespace {namespace}: {e}"))?;
        if exists {
            return Ok(false);
        }

        match self.cluster.create_namespace(namespace).await {
            Ok(()) => Ok(true),
            Err(e) => match self.cluster.namespace_exists(namespace).await {
                Ok(true) => Ok(false),
                _ => Err(format!("creating namespace {namespace}: {e}")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::WorkloadRef;
    use crate::fakes::MemoryCluster;

    #[tokio::test]
    async fn test_creates_namespace_then_applies() {
        let w = WorkloadRef::deployment("order-service", "order-service");
        let cluster = Arc::new(MemoryCluster::new().with_manifest("all.yaml", vec![w.clone()]));
        let applier = ManifestApplier::new(cluster.clone());

        let outcome = applier.apply_all(&[PathBuf::from("all.yaml")], "pets").await;

        assert!(outcome.succeeded());
        assert!(outcome.namespace_created);
        assert_eq!(outcome.applied, vec![PathBuf::from("all.yaml")]);
        assert!(cluster.has_namespace("pets"));
        assert_eq!(cluster.calls_to("create_namespace").len(), 1);
    }

    #[tokio::test]
    async fn test_existing_namespace_is_not_recreated() {
        let cluster = Arc::new(MemoryCluster::new().with_workloads("pets", &[]));
        let applier = ManifestApplier::new(cluster.clone());

        let outcome = applier.apply_all(&[PathBuf::from("all.yaml")], "pets").await;

        assert!(outcome.succeeded());
        assert!(!outcome.namespace_created);
        assert!(cluster.calls_to("create_namespace").is_empty());
    }

    #[tokio::test]
    async fn test_apply_failure_is_reported() {
        let cluster = Arc::new(MemoryCluster::new());
        cluster.fail_apply();
        let applier = ManifestApplier::new(cluster.clone());

        let outcome = applier
            .apply_all(&[PathBuf::from("a.yaml"), PathBuf::from("b.yaml")], "pets")
            .await;

        assert!(!outcome.succeeded());
        assert!(outcome.applied.is_empty());
        assert_eq!(cluster.calls_to("apply_manifest").len(), 1);
    }
}
