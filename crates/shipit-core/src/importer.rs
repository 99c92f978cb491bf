//! Idempotent mirroring of third-party images into the target registry.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::batch::run_batch;
use crate::cancel::Cancellation;
use crate::collaborators::Registry;
use crate::config::QueryFailurePolicy;
use crate::domain::catalog::ImportSpec;

/// What happened to one seed catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportStatus {
    /// The pinned tag was missing and the image was imported under `tags`.
    Imported { tags: Vec<String> },

    /// The pinned tag was already present; nothing was written.
    Skipped,

    /// The entry could not be ensured.
    Failed { error: String },

    /// The run was cancelled before this entry started.
    Cancelled,
}

/// Outcome of a single import, as reported in the release summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportOutcome {
    pub name: String,
    pub version_tag: String,

    #[serde(flatten)]
    pub status: ImportStatus,

    /// Tag query error that was tolerated under `assume_missing`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_error: Option<String>,

    pub duration_ms: u64,
}

impl ImportOutcome {
    /// Whether the image is now available under its pinned tag.
    pub fn is_available(&self) -> bool {
        matches!(
            self.status,
            ImportStatus::Imported { .. } | ImportStatus::Skipped
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ImportStatus::Failed { .. })
    }

    fn cancelled(spec: &ImportSpec) -> Self {
        Self {
            name: spec.name.clone(),
            version_tag: spec.version_tag.clone(),
            status: ImportStatus::Cancelled,
            query_error: None,
            duration_ms: 0,
        }
    }
}

/// Ensures every seed catalog entry exists in the registry.
pub struct RegistryImporter {
    registry: Arc<dyn Registry>,
    on_query_failure: QueryFailurePolicy,
}

impl RegistryImporter {
    pub fn new(registry: Arc<dyn Registry>, on_query_failure: QueryFailurePolicy) -> Self {
        Self {
            registry,
            on_query_failure,
        }
    }

    /// Import `spec` unless its pinned tag is already published.
    pub async fn import_if_missing(&self, spec: &ImportSpec) -> ImportOutcome {
        let start = Instant::now();
        let mut query_error = None;

        let present = match self.registry.list_tags(&spec.name).await {
            Ok(tags) => tags.contains(&spec.version_tag),
            Err(e) => match self.on_query_failure {
                QueryFailurePolicy::AssumeMissing => {
                    warn!(image = %spec.name, error = %e, "tag query failed, importing anyway");
                    query_error = Some(e.to_string());
                    false
                }
                QueryFailurePolicy::Fail => {
                    return ImportOutcome {
                        name: spec.name.clone(),
                        version_tag: spec.version_tag.clone(),
                        status: ImportStatus::Failed {
                            error: format!("tag query failed: {e}"),
                        },
                        query_error: None,
                        duration_ms: start.elapsed().as_millis() as u64,
                    };
                }
            },
        };

        let status = if present {
            debug!(image = %spec.name, tag = %spec.version_tag, "already present");
            ImportStatus::Skipped
        } else {
            let tags = spec.publish_tags();
            match self
                .registry
                .import_image(&spec.upstream_source, &spec.name, &tags)
                .await
            {
                Ok(()) => ImportStatus::Imported { tags },
                Err(e) => ImportStatus::Failed {
                    error: e.to_string(),
                },
            }
        };

        ImportOutcome {
            name: spec.name.clone(),
            version_tag: spec.version_tag.clone(),
            status,
            query_error,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Process the whole catalog; one entry's failure never stops the others.
    pub async fn import_all(
        &self,
        catalog: &[ImportSpec],
        max_parallel: usize,
        cancel: &Cancellation,
    ) -> Vec<ImportOutcome> {
        let results = run_batch(catalog, max_parallel, cancel, |spec| {
            self.import_if_missing(spec)
        })
        .await;

        catalog
            .iter()
            .zip(results)
            .map(|(spec, result)| result.unwrap_or_else(|| ImportOutcome::cancelled(spec)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryRegistry;

    fn rabbit() -> ImportSpec {
        ImportSpec::new(
            "rabbitmq",
            "3.12-management",
            "docker.io/library/rabbitmq:3.12-management",
        )
    }

    #[tokio::test]
    async fn test_present_tag_is_skipped() {
        let registry = Arc::new(MemoryRegistry::new().with_tags("rabbitmq", &["3.12-management"]));
        let importer = RegistryImporter::new(registry.clone(), QueryFailurePolicy::AssumeMissing);

        let outcome = importer.import_if_missing(&rabbit()).await;
        assert_eq!(outcome.status, ImportStatus::Skipped);
        assert!(registry.writes().is_empty());
    }

    #[tokio::test]
    async fn test_missing_tag_imports_both_tags() {
        let registry = Arc::new(MemoryRegistry::new().with_tags("rabbitmq", &["3.11"]));
        let importer = RegistryImporter::new(registry.clone(), QueryFailurePolicy::AssumeMissing);

        let outcome = importer.import_if_missing(&rabbit()).await;
        assert!(matches!(outcome.status, ImportStatus::Imported { .. }));
        let tags = registry.tags("rabbitmq");
        assert!(tags.contains("3.12-management"));
        assert!(tags.contains("latest"));
    }

    #[tokio::test]
    async fn test_query_failure_assume_missing_imports() {
        let registry = Arc::new(MemoryRegistry::new().with_tags("rabbitmq", &["3.12-management"]));
        registry.fail_query("rabbitmq");
        let importer = RegistryImporter::new(registry.clone(), QueryFailurePolicy::AssumeMissing);

        let outcome = importer.import_if_missing(&rabbit()).await;
        assert!(matches!(outcome.status, ImportStatus::Imported { .. }));
        assert!(outcome.query_error.is_some());
        assert_eq!(registry.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_query_failure_fail_policy() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.fail_query("rabbitmq");
        let importer = RegistryImporter::new(registry.clone(), QueryFailurePolicy::Fail);

        let outcome = importer.import_if_missing(&rabbit()).await;
        assert!(outcome.is_failed());
        assert!(registry.writes().is_empty());
    }

    #[tokio::test]
    async fn test_failed_import_does_not_stop_batch() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.fail_import("rabbitmq");
        let importer = RegistryImporter::new(registry.clone(), QueryFailurePolicy::AssumeMissing);
        let catalog = vec![rabbit(), ImportSpec::new("mongo", "6", "docker.io/library/mongo:6")];

        let outcomes = importer.import_all(&catalog, 1, &Cancellation::never()).await;
        assert!(outcomes[0].is_failed());
        assert!(outcomes[1].is_available());
        assert!(registry.tags("mongo").contains("6"));
    }

    #[tokio::test]
    async fn test_second_run_is_all_skipped() {
        let registry = Arc::new(MemoryRegistry::new());
        let importer = RegistryImporter::new(registry.clone(), QueryFailurePolicy::AssumeMissing);
        let catalog = crate::domain::Catalog::default().seed;

        let first = importer.import_all(&catalog, 2, &Cancellation::never()).await;
        assert!(first.iter().all(|o| matches!(o.status, ImportStatus::Imported { .. })));

        let second = importer.import_all(&catalog, 2, &Cancellation::never()).await;
        assert!(second.iter().all(|o| o.status == ImportStatus::Skipped));
    }
}
