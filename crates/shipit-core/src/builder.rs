//! Build and dual-tag publication of first-party images.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::batch::run_batch;
use crate::cancel::Cancellation;
use crate::collaborators::{ImageBuild, Registry};
use crate::domain::catalog::{BuildSpec, LATEST_TAG};
use crate::domain::run_context::RunIdentifier;

/// What happened to one build catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildStatus {
    /// Both the run tag and `latest` are published.
    Published { tags: Vec<String> },

    Failed { error: String },

    /// The run was cancelled before this entry started.
    Cancelled,
}

/// Outcome of a single build, as reported in the release summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildOutcome {
    pub name: String,

    #[serde(flatten)]
    pub status: BuildStatus,

    pub duration_ms: u64,
}

impl BuildOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self.status, BuildStatus::Published { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, BuildStatus::Failed { .. })
    }
}

/// Builds every first-party image and publishes it under two tags.
pub struct ImageBuilder {
    builder: Arc<dyn ImageBuild>,
    registry: Arc<dyn Registry>,
    verify_published_tags: bool,
}

impl ImageBuilder {
    pub fn new(
        builder: Arc<dyn ImageBuild>,
        registry: Arc<dyn Registry>,
        verify_published_tags: bool,
    ) -> Self {
        Self {
            builder,
            registry,
            verify_published_tags,
        }
    }

    /// Tags every first-party image is published under for `run_id`.
    pub fn publish_tags(run_id: &RunIdentifier) -> Vec<String> {
        vec![run_id.as_str().to_string(), LATEST_TAG.to_string()]
    }

    /// Build `spec` and publish it under `run_id` and `latest`.
    ///
    /// A `Published` outcome guarantees both tags exist in the registry.
    pub async fn build_and_publish(&self, spec: &BuildSpec, run_id: &RunIdentifier) -> BuildOutcome {
        let start = Instant::now();
        let tags = Self::publish_tags(run_id);

        let status = match self.builder.build(&spec.build_context, &spec.name, &tags).await {
            Err(e) => BuildStatus::Failed {
                error: e.to_string(),
            },
            Ok(()) if self.verify_published_tags => self.verify(&spec.name, tags).await,
            Ok(()) => BuildStatus::Published { tags },
        };

        BuildOutcome {
            name: spec.name.clone(),
            status,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn verify(&self, name: &str, tags: Vec<String>) -> BuildStatus {
        match self.registry.list_tags(name).await {
            Ok(published) => {
                let missing: Vec<&str> = tags
                    .iter()
                    .filter(|t| !published.contains(*t))
                    .map(String::as_str)
                    .collect();
                if missing.is_empty() {
                    debug!(image = %name, "both tags verified");
                    BuildStatus::Published { tags }
                } else {
                    BuildStatus::Failed {
                        error: format!("build reported success but tags are missing: {}", missing.join(", ")),
                    }
                }
            }
            Err(e) => BuildStatus::Failed {
                error: format!("could not verify published tags: {e}"),
            },
        }
    }

    /// Attempt every catalog entry regardless of earlier failures.
    pub async fn build_all(
        &self,
        catalog: &[BuildSpec],
        run_id: &RunIdentifier,
        max_parallel: usize,
        cancel: &Cancellation,
    ) -> Vec<BuildOutcome> {
        let results = run_batch(catalog, max_parallel, cancel, |spec| {
            self.build_and_publish(spec, run_id)
        })
        .await;

        catalog
            .iter()
            .zip(results)
            .map(|(spec, result)| {
                result.unwrap_or_else(|| BuildOutcome {
                    name: spec.name.clone(),
                    status: BuildStatus::Cancelled,
                    duration_ms: 0,
                })
            })
            .collect()
    }
}
