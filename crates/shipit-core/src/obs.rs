//! Structured observability hooks for the release lifecycle.
//!
//! This module provides:
//! - A run-scoped tracing span carrying the run identifier
//! - Emission functions for key lifecycle events: start, intent, per-entry
//!   outcomes, presence, manifest application and finish
//!
//! Events are emitted at `info!` level, or `warn!` when an entry failed.
//! For JSON output, pass `--json` to the binary.

use tracing::{info, warn};

use crate::applier::ApplyOutcome;
use crate::builder::{BuildOutcome, BuildStatus};
use crate::domain::IntentSet;
use crate::importer::{ImportOutcome, ImportStatus};
use crate::presence::PresenceRecord;
use crate::report::ReleaseSummary;
use crate::rollout::{RolloutOutcome, RolloutStatus};

/// Span tagged with the run identifier; attach with `Instrument::instrument`.
pub fn release_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("shipit.release", run_id = %run_id)
}

/// Emit event: release started against a namespace and registry.
pub fn emit_release_started(run_id: &str, namespace: &str, registry: &str) {
    info!(event = "release.started", run_id = %run_id, namespace = %namespace, registry = %registry);
}

pub fn emit_intent(intent: &IntentSet) {
    info!(
        event = "release.intent",
        seed_third_party = intent.seed_third_party,
        build_first_party = intent.build_first_party,
    );
}

pub fn emit_import_outcome(outcome: &ImportOutcome) {
    match &outcome.status {
        ImportStatus::Failed { error } => {
            warn!(event = "import.outcome", image = %outcome.name, status = "failed", error = %error)
        }
        ImportStatus::Imported { .. } => {
            info!(event = "import.outcome", image = %outcome.name, status = "imported", duration_ms = outcome.duration_ms)
        }
        ImportStatus::Skipped => info!(event = "import.outcome", image = %outcome.name, status = "skipped"),
        ImportStatus::Cancelled => info!(event = "import.outcome", image = %outcome.name, status = "cancelled"),
    }
}

pub fn emit_build_outcome(outcome: &BuildOutcome) {
    match &outcome.status {
        BuildStatus::Failed { error } => {
            warn!(event = "build.outcome", image = %outcome.name, status = "failed", error = %error)
        }
        BuildStatus::Published { tags } => info!(
            event = "build.outcome",
            image = %outcome.name,
            status = "published",
            tags = %tags.join(","),
            duration_ms = outcome.duration_ms,
        ),
        BuildStatus::Cancelled => info!(event = "build.outcome", image = %outcome.name, status = "cancelled"),
    }
}

pub fn emit_presence_checked(record: &PresenceRecord) {
    info!(
        event = "presence.checked",
        workload = %record.workload,
        namespace = %record.namespace,
        present = record.present,
    );
}

pub fn emit_manifest_applied(outcome: &ApplyOutcome) {
    match &outcome.error {
        None => info!(
            event = "manifest.applied",
            namespace = %outcome.namespace,
            namespace_created = outcome.namespace_created,
            manifests = outcome.applied.len(),
        ),
        Some(error) => warn!(event = "manifest.applied", namespace = %outcome.namespace, error = %error),
    }
}

pub fn emit_rollout_outcome(outcome: &RolloutOutcome) {
    let status = match &outcome.status {
        RolloutStatus::UpdatedReady => "updated_ready",
        RolloutStatus::UpdatedNotReady { .. } => "updated_not_ready",
        RolloutStatus::UpdateFailed { .. } => "update_failed",
        RolloutStatus::Skipped { .. } => "skipped",
    };
    info!(
        event = "rollout.outcome",
        workload = %outcome.workload,
        image = %outcome.image,
        restarted = outcome.restarted,
        status = status,
    );
}

/// Emit event: release finished with its overall verdict.
pub fn emit_release_finished(summary: &ReleaseSummary) {
    let duration_ms = (summary.finished_at - summary.started_at).num_milliseconds();
    if summary.succeeded() {
        info!(event = "release.finished", run_id = %summary.run_id, duration_ms = duration_ms, success = true);
    } else {
        warn!(
            event = "release.finished",
            run_id = %summary.run_id,
            duration_ms = duration_ms,
            success = false,
            cancelled = summary.cancelled,
            hard_failures = summary.hard_failures.len(),
        );
    }
}
