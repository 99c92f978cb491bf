//! Static image and workload catalogs.
//!
//! Catalogs are data: the orchestrator iterates them uniformly, so adding a
//! service is a new entry here (or in the `[catalog]` config section), never a
//! new branch in the control flow.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;

use crate::domain::error::{Result, ShipitError};

/// The floating tag reassigned on every publish.
pub const LATEST_TAG: &str = "latest";

/// A third-party image to mirror into the target registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSpec {
    /// Repository name inside the target registry.
    pub name: String,

    /// Pinned tag whose presence makes the import a no-op.
    pub version_tag: String,

    /// Fully qualified upstream reference to import from.
    pub upstream_source: String,
}

impl ImportSpec {
    pub fn new(name: &str, version_tag: &str, upstream_source: &str) -> Self {
        Self {
            name: name.to_string(),
            version_tag: version_tag.to_string(),
            upstream_source: upstream_source.to_string(),
        }
    }

    /// Tags an import publishes: the pinned tag and `latest`, deduplicated.
    pub fn publish_tags(&self) -> Vec<String> {
        let mut tags = vec![self.version_tag.clone()];
        if self.version_tag != LATEST_TAG {
            tags.push(LATEST_TAG.to_string());
        }
        tags
    }
}

/// A first-party image built from source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildSpec {
    /// Repository name inside the target registry.
    pub name: String,

    /// Build context directory, relative to the working directory.
    pub build_context: PathBuf,
}

impl BuildSpec {
    pub fn new(name: &str, build_context: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            build_context: build_context.into(),
        }
    }
}

/// Kind of a cluster workload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    Deployment,
    #[serde(alias = "statefulset")]
    StatefulSet,
}

impl WorkloadKind {
    /// Resource name as the cluster CLI spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "deployment",
            WorkloadKind::StatefulSet => "statefulset",
        }
    }

    /// Whether an image update must be followed by an explicit restart.
    ///
    /// Stateful sets keep their pods when the reference string is unchanged,
    /// so a new digest behind `latest` is only picked up after a restart.
    pub fn requires_explicit_restart(&self) -> bool {
        matches!(self, WorkloadKind::StatefulSet)
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit whose container image can be updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WorkloadRef {
    pub kind: WorkloadKind,
    pub name: String,
    pub container: String,
}

impl WorkloadRef {
    pub fn deployment(name: &str, container: &str) -> Self {
        Self {
            kind: WorkloadKind::Deployment,
            name: name.to_string(),
            container: container.to_string(),
        }
    }

    pub fn stateful_set(name: &str, container: &str) -> Self {
        Self {
            kind: WorkloadKind::StatefulSet,
            name: name.to_string(),
            container: container.to_string(),
        }
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// All static release tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Catalog {
    /// Third-party images seeded into the registry.
    pub seed: Vec<ImportSpec>,

    /// First-party images built from source.
    pub build: Vec<BuildSpec>,

    /// Image name to the workload running it.
    pub workloads: BTreeMap<String, WorkloadRef>,

    /// Image name whose workload decides first-time deployment.
    pub presence_probe: String,
}

impl Default for Catalog {
    fn default() -> Self {
        let seed = vec![
            ImportSpec::new(
                "rabbitmq",
                "3.12-management",
                "docker.io/library/rabbitmq:3.12-management",
            ),
            ImportSpec::new("mongo", "6", "docker.io/library/mongo:6"),
            ImportSpec::new(
                "product-service",
                LATEST_TAG,
                "ghcr.io/azure-samples/aks-store-demo/product-service:latest",
            ),
            ImportSpec::new(
                "virtual-customer",
                LATEST_TAG,
                "ghcr.io/azure-samples/aks-store-demo/virtual-customer:latest",
            ),
            ImportSpec::new(
                "virtual-worker",
                LATEST_TAG,
                "ghcr.io/azure-samples/aks-store-demo/virtual-worker:latest",
            ),
        ];

        let build = ["order-service", "store-front", "store-admin", "makeline-service"]
            .into_iter()
            .map(|name| BuildSpec::new(name, format!("src/{name}")))
            .collect();

        let mut workloads = BTreeMap::new();
        workloads.insert(
            "rabbitmq".to_string(),
            WorkloadRef::stateful_set("rabbitmq", "rabbitmq"),
        );
        workloads.insert(
            "mongo".to_string(),
            WorkloadRef::stateful_set("mongodb", "mongodb"),
        );
        for name in [
            "product-service",
            "virtual-customer",
            "virtual-worker",
            "order-service",
            "store-front",
            "store-admin",
            "makeline-service",
        ] {
            workloads.insert(name.to_string(), WorkloadRef::deployment(name, name));
        }

        Self {
            seed,
            build,
            workloads,
            presence_probe: "order-service".to_string(),
        }
    }
}

impl Catalog {
    /// Workload running the given image, if any.
    pub fn workload_for(&self, image_name: &str) -> Option<&WorkloadRef> {
        self.workloads.get(image_name)
    }

    /// Workload probed to decide between first deployment and update.
    pub fn presence_workload(&self) -> Result<&WorkloadRef> {
        self.workload_for(&self.presence_probe).ok_or_else(|| {
            ShipitError::InvalidCatalog(format!(
                "presence probe '{}' has no workload entry",
                self.presence_probe
            ))
        })
    }

    /// Check names are unique and every image maps to a workload.
    pub fn validate(&self) -> Result<()> {
        check_unique("seed", self.seed.iter().map(|s| s.name.as_str()))?;
        check_unique("build", self.build.iter().map(|s| s.name.as_str()))?;

        for spec in &self.seed {
            if spec.version_tag.trim().is_empty() || spec.upstream_source.trim().is_empty() {
                return Err(ShipitError::InvalidCatalog(format!(
                    "seed entry '{}' needs a version tag and an upstream source",
                    spec.name
                )));
            }
        }

        let names = self
            .seed
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.build.iter().map(|s| s.name.as_str()));
        for name in names {
            if self.workload_for(name).is_none() {
                return Err(ShipitError::InvalidCatalog(format!(
                    "image '{name}' has no workload entry"
                )));
            }
        }

        self.presence_workload()?;
        Ok(())
    }

    /// SHA-256 over the serialized catalog, recorded in every run summary.
    pub fn digest(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

fn check_unique<'a>(table: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(ShipitError::InvalidCatalog(format!(
                "{table} catalog contains an empty name"
            )));
        }
        if !seen.insert(name) {
            return Err(ShipitError::InvalidCatalog(format!(
                "duplicate name '{name}' in {table} catalog"
            )));
        }
    }
    Ok(())
}
