//! shipit core library
//!
//! Conditional release orchestration: a trigger message selects which of
//! seeding third-party images, building first-party images and rolling
//! workloads onto new versions a run performs. External systems are reached
//! through the traits in [`collaborators`]; process-backed implementations
//! live in the `shipit-exec` crate.

pub mod applier;
pub mod batch;
pub mod builder;
pub mod cancel;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod fakes;
pub mod git;
pub mod importer;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod plan;
pub mod presence;
pub mod report;
pub mod rollout;
pub mod telemetry;

pub use applier::{ApplyOutcome, ManifestApplier};
pub use builder::{BuildOutcome, BuildStatus, ImageBuilder};
pub use cancel::{CancelHandle, Cancellation};
pub use collaborators::{Cluster, ImageBuild, Registry};
pub use config::{ManifestConfig, QueryFailurePolicy, ReleasePolicy, ShipitConfig, TargetConfig};
pub use domain::{
    parse_intent, BuildSpec, Catalog, CollaboratorError, CollaboratorResult, ImportSpec,
    IntentSet, Result, RunContext, RunIdentifier, ShipitError, WorkloadKind, WorkloadRef,
    LATEST_TAG,
};
pub use git::{head_commit_message, is_git_repo};
pub use importer::{ImportOutcome, ImportStatus, RegistryImporter};
pub use orchestrator::{Collaborators, ReleaseOrchestrator};
pub use plan::{plan_release, PlannedStep};
pub use presence::{workload_present, PresenceRecord};
pub use report::{ReleaseSummary, EXIT_CANCELLED, EXIT_FAILURE, EXIT_SUCCESS};
pub use rollout::{RolloutController, RolloutOutcome, RolloutReport, RolloutStatus, WorkloadUpdate};
