//! Conditional release state machine.
//!
//! The intent parsed from the trigger message gates everything:
//!
//! ```text
//! [seed] -> import_all
//! [app]  -> build_all -> presence check -> (absent: apply manifests once)
//! then   -> roll third-party workloads onto `latest`
//!        -> roll first-party workloads onto the run tag
//! ```
//!
//! Registry work for both intents happens before the presence gate, and no
//! workload is touched until the gate has passed. Every run ends with a
//! [`ReleaseSummary`]; nothing here returns early with an error.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use crate::applier::ManifestApplier;
use crate::builder::{BuildOutcome, BuildStatus, ImageBuilder};
use crate::cancel::Cancellation;
use crate::collaborators::{Cluster, ImageBuild, Registry};
use crate::config::{ReleasePolicy, ShipitConfig};
use crate::domain::catalog::{Catalog, WorkloadRef, LATEST_TAG};
use crate::domain::{parse_intent, RunContext};
use crate::importer::{ImportOutcome, ImportStatus, RegistryImporter};
use crate::metrics::METRICS;
use crate::obs;
use crate::presence::workload_present;
use crate::report::ReleaseSummary;
use crate::rollout::{RolloutController, RolloutReport, WorkloadUpdate, CANCELLED_REASON};

/// Reason recorded for workloads left alone because the run was cancelled.
pub const SKIP_CANCELLED: &str = CANCELLED_REASON;
pub const SKIP_IMPORT_FAILED: &str = "image import failed";
pub const SKIP_BUILD_FAILED: &str = "image failed to publish";
pub const SKIP_APPLY_FAILED: &str = "manifest apply failed";

/// The three external collaborators a run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn Registry>,
    pub builder: Arc<dyn ImageBuild>,
    pub cluster: Arc<dyn Cluster>,
}

/// One slot of a rollout batch, kept in catalog order.
enum Planned {
    Update(WorkloadUpdate),
    Skip(WorkloadRef, &'static str),
}

/// Verdict of the first-deployment gate.
enum Gate {
    Open,

    /// The run stops before any rollout.
    Stopped,

    /// First-party workloads are skipped for this reason.
    Blocked(&'static str),
}

/// Drives one release run end to end.
pub struct ReleaseOrchestrator {
    collaborators: Collaborators,
    catalog: Catalog,
    policy: ReleasePolicy,
    manifests: Vec<PathBuf>,
}

impl ReleaseOrchestrator {
    pub fn new(collaborators: Collaborators, config: &ShipitConfig) -> Self {
        Self {
            collaborators,
            catalog: config.catalog.clone(),
            policy: config.policy.clone(),
            manifests: config.manifests.paths.clone(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Run the release requested by `message` against `ctx`.
    pub async fn run(
        &self,
        message: &str,
        ctx: &RunContext,
        cancel: &Cancellation,
    ) -> ReleaseSummary {
        let span = obs::release_span(ctx.run_id.as_str());
        self.run_inner(message, ctx, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        message: &str,
        ctx: &RunContext,
        cancel: &Cancellation,
    ) -> ReleaseSummary {
        obs::emit_release_started(ctx.run_id.as_str(), &ctx.namespace, &ctx.registry);

        let intent = parse_intent(message);
        obs::emit_intent(&intent);

        let digest = self.catalog.digest().unwrap_or_else(|e| {
            warn!(error = %e, "could not digest catalog");
            String::new()
        });
        let mut summary = ReleaseSummary::begin(ctx, intent, digest);

        if intent.is_empty() {
            info!("no release tag in trigger message");
        }

        if intent.seed_third_party {
            self.import_images(cancel, &mut summary).await;
        }

        let gate = if intent.build_first_party {
            self.build_images(ctx, cancel, &mut summary).await;
            self.first_deployment_gate(ctx, cancel, &mut summary).await
        } else {
            Gate::Open
        };

        if let Gate::Stopped = gate {
            return self.finish(summary, cancel);
        }

        if intent.seed_third_party {
            let planned = self.plan_seed_rollout(ctx, &summary.imports);
            summary.seed_rollout = Some(self.roll(planned, &ctx.namespace, cancel).await);
        }

        if intent.build_first_party {
            let report = match gate {
                Gate::Blocked(reason) => self.skip_all_builds(&summary.builds, reason),
                _ => {
                    let planned = self.plan_app_rollout(ctx, &summary.builds);
                    self.roll(planned, &ctx.namespace, cancel).await
                }
            };
            summary.app_rollout = Some(report);
        }

        self.finish(summary, cancel)
    }

    /// Make sure every third-party image is in the registry.
    async fn import_images(&self, cancel: &Cancellation, summary: &mut ReleaseSummary) {
        let importer = RegistryImporter::new(
            self.collaborators.registry.clone(),
            self.policy.on_query_failure,
        );
        let imports = importer
            .import_all(&self.catalog.seed, self.policy.max_parallel, cancel)
            .await;

        for outcome in &imports {
            obs::emit_import_outcome(outcome);
            METRICS.record_import(outcome);
            if let ImportStatus::Failed { error } = &outcome.status {
                if self.policy.tolerate_import_failures {
                    warn!(image = %outcome.name, "import failure tolerated by policy");
                } else {
                    summary.hard_failures.push(format!(
                        "import {}:{} failed: {error}",
                        outcome.name, outcome.version_tag
                    ));
                }
            }
        }
        summary.imports = imports;
    }

    fn plan_seed_rollout(&self, ctx: &RunContext, imports: &[ImportOutcome]) -> Vec<Planned> {
        imports
            .iter()
            .filter_map(|outcome| {
                let workload = self.workload(&outcome.name)?;
                Some(match outcome.status {
                    ImportStatus::Imported { .. } | ImportStatus::Skipped => {
                        Planned::Update(WorkloadUpdate {
                            workload,
                            image: ctx.image_ref(&outcome.name, LATEST_TAG),
                        })
                    }
                    ImportStatus::Failed { .. } => Planned::Skip(workload, SKIP_IMPORT_FAILED),
                    ImportStatus::Cancelled => Planned::Skip(workload, SKIP_CANCELLED),
                })
            })
            .collect()
    }

    /// Build and publish every first-party image under the run tag.
    async fn build_images(
        &self,
        ctx: &RunContext,
        cancel: &Cancellation,
        summary: &mut ReleaseSummary,
    ) {
        let images = ImageBuilder::new(
            self.collaborators.builder.clone(),
            self.collaborators.registry.clone(),
            self.policy.verify_published_tags,
        );
        let builds = images
            .build_all(&self.catalog.build, &ctx.run_id, self.policy.max_parallel, cancel)
            .await;

        for outcome in &builds {
            obs::emit_build_outcome(outcome);
            METRICS.record_build(outcome);
            if let BuildStatus::Failed { error } = &outcome.status {
                summary
                    .hard_failures
                    .push(format!("build {} failed: {error}", outcome.name));
            }
        }
        summary.builds = builds;
    }

    /// Check whether the application is deployed and apply the manifests when
    /// it is not. Runs before any workload is touched.
    async fn first_deployment_gate(
        &self,
        ctx: &RunContext,
        cancel: &Cancellation,
        summary: &mut ReleaseSummary,
    ) -> Gate {
        if cancel.is_cancelled() {
            return Gate::Blocked(SKIP_CANCELLED);
        }

        let probe = match self.catalog.presence_workload() {
            Ok(probe) => probe,
            Err(e) => {
                summary.fatal = Some(e.to_string());
                return Gate::Stopped;
            }
        };

        let presence =
            workload_present(self.collaborators.cluster.as_ref(), probe, &ctx.namespace).await;
        let record = match presence {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "presence check failed, stopping run");
                summary.fatal = Some(e.to_string());
                return Gate::Stopped;
            }
        };
        obs::emit_presence_checked(&record);
        let first_deployment = !record.present;
        summary.presence = Some(record);

        if !first_deployment {
            return Gate::Open;
        }

        let applier = ManifestApplier::new(self.collaborators.cluster.clone());
        let outcome = applier.apply_all(&self.manifests, &ctx.namespace).await;
        obs::emit_manifest_applied(&outcome);
        let failed = outcome.error.clone();
        summary.manifest = Some(outcome);

        match failed {
            Some(error) => {
                summary.hard_failures.push(format!("manifest apply failed: {error}"));
                Gate::Blocked(SKIP_APPLY_FAILED)
            }
            None => Gate::Open,
        }
    }

    fn plan_app_rollout(&self, ctx: &RunContext, builds: &[BuildOutcome]) -> Vec<Planned> {
        builds
            .iter()
            .filter_map(|outcome| {
                let workload = self.workload(&outcome.name)?;
                Some(match outcome.status {
                    BuildStatus::Published { .. } => Planned::Update(WorkloadUpdate {
                        workload,
                        image: ctx.image_ref(&outcome.name, ctx.run_id.as_str()),
                    }),
                    BuildStatus::Failed { .. } => Planned::Skip(workload, SKIP_BUILD_FAILED),
                    BuildStatus::Cancelled => Planned::Skip(workload, SKIP_CANCELLED),
                })
            })
            .collect()
    }

    fn skip_all_builds(&self, builds: &[BuildOutcome], reason: &str) -> RolloutReport {
        let mut report = RolloutReport::default();
        for outcome in builds {
            if let Some(workload) = self.workload(&outcome.name) {
                report.push_skipped(workload, reason);
            }
        }
        report
    }

    /// Roll out the `Update` slots and merge the results back in catalog order.
    async fn roll(&self, planned: Vec<Planned>, namespace: &str, cancel: &Cancellation) -> RolloutReport {
        let updates: Vec<WorkloadUpdate> = planned
            .iter()
            .filter_map(|p| match p {
                Planned::Update(update) => Some(update.clone()),
                Planned::Skip(..) => None,
            })
            .collect();

        let controller = RolloutController::new(
            self.collaborators.cluster.clone(),
            self.policy.rollout_timeout(),
        );
        let rolled = controller.rollout(&updates, namespace, cancel).await;
        METRICS.record_rollout(&rolled);

        let mut rolled = rolled.outcomes.into_iter();
        let mut report = RolloutReport::default();
        for slot in planned {
            match slot {
                Planned::Update(_) => report.outcomes.extend(rolled.next()),
                Planned::Skip(workload, reason) => report.push_skipped(workload, reason),
            }
        }

        for outcome in &report.outcomes {
            obs::emit_rollout_outcome(outcome);
        }
        report
    }

    fn workload(&self, image_name: &str) -> Option<WorkloadRef> {
        let workload = self.catalog.workload_for(image_name).cloned();
        if workload.is_none() {
            warn!(image = %image_name, "no workload mapped to image, not rolling out");
        }
        workload
    }

    fn finish(&self, mut summary: ReleaseSummary, cancel: &Cancellation) -> ReleaseSummary {
        summary.cancelled = cancel.is_cancelled() && summary.has_cancelled_entries();
        summary.finished_at = Utc::now();
        obs::emit_release_finished(&summary);
        METRICS.flush();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RunIdentifier;
    use crate::fakes::{MemoryBuilder, MemoryCluster, MemoryRegistry};

    struct Harness {
        registry: Arc<MemoryRegistry>,
        builder: Arc<MemoryBuilder>,
        cluster: Arc<MemoryCluster>,
        orchestrator: ReleaseOrchestrator,
    }

    fn harness(cluster: MemoryCluster) -> Harness {
        let registry = Arc::new(MemoryRegistry::new());
        let builder = Arc::new(MemoryBuilder::new(registry.clone()));
        let cluster = Arc::new(cluster);
        let mut config = ShipitConfig::default();
        config.target.registry = "acr.io".to_string();
        let orchestrator = ReleaseOrchestrator::new(
            Collaborators {
                registry: registry.clone(),
                builder: builder.clone(),
                cluster: cluster.clone(),
            },
            &config,
        );
        Harness {
            registry,
            builder,
            cluster,
            orchestrator,
        }
    }

    fn ctx() -> RunContext {
        RunContext::new(RunIdentifier::parse("812").unwrap(), "pets", "acr.io")
    }

    #[tokio::test]
    async fn test_untagged_message_touches_nothing() {
        let h = harness(MemoryCluster::new());
        let summary = h
            .orchestrator
            .run("refactor logging", &ctx(), &Cancellation::never())
            .await;

        assert!(summary.succeeded());
        assert!(h.registry.calls().is_empty());
        assert!(h.builder.calls().is_empty());
        assert!(h.cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn test_seed_skips_workload_whose_import_failed() {
        let h = harness(MemoryCluster::new());
        h.registry.fail_import("mongo");

        let summary = h
            .orchestrator
            .run("[seed]", &ctx(), &Cancellation::never())
            .await;

        let rollout = summary.seed_rollout.as_ref().unwrap();
        assert!(matches!(
            rollout.get("mongodb").unwrap().status,
            crate::rollout::RolloutStatus::Skipped { .. }
        ));
        assert_eq!(summary.hard_failures.len(), 1);
        assert_eq!(summary.exit_code(), crate::report::EXIT_FAILURE);
    }

    #[tokio::test]
    async fn test_rollout_order_follows_catalog() {
        let h = harness(MemoryCluster::new());
        h.builder.fail_build("store-front");

        let summary = h
            .orchestrator
            .run("[app]", &ctx(), &Cancellation::never())
            .await;

        let names: Vec<&str> = summary
            .app_rollout
            .as_ref()
            .unwrap()
            .outcomes
            .iter()
            .map(|o| o.workload.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["order-service", "store-front", "store-admin", "makeline-service"]
        );
    }

    #[tokio::test]
    async fn test_interrupt_after_completion_is_not_a_cancellation() {
        let h = harness(MemoryCluster::new());
        let summary = h
            .orchestrator
            .run("[seed]", &ctx(), &Cancellation::never())
            .await;

        let (handle, late) = Cancellation::new();
        handle.cancel();
        let summary = h.orchestrator.finish(summary, &late);

        assert!(!summary.cancelled);
        assert_eq!(summary.exit_code(), crate::report::EXIT_SUCCESS);
    }
}
