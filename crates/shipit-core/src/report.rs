//! Release summary artifact.
//!
//! Every run concludes with a [`ReleaseSummary`], whatever happened. It is
//! rendered as plain text for the operator and can be written as JSON for CI
//! consumers (`release_summary.json`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::applier::ApplyOutcome;
use crate::builder::{BuildOutcome, BuildStatus};
use crate::domain::error::Result;
use crate::domain::{IntentSet, RunContext};
use crate::importer::{ImportOutcome, ImportStatus};
use crate::presence::PresenceRecord;
use crate::rollout::{RolloutReport, RolloutStatus};

/// Process exit code of a successful run.
pub const EXIT_SUCCESS: i32 = 0;

/// Process exit code when a hard failure occurred.
pub const EXIT_FAILURE: i32 = 1;

/// Process exit code of a cancelled run (128 + SIGINT).
pub const EXIT_CANCELLED: i32 = 130;

/// Structured outcome of one release run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseSummary {
    pub run_id: String,
    pub namespace: String,
    pub registry: String,
    pub intent: IntentSet,

    /// SHA-256 of the catalogs the run used.
    pub catalog_digest: String,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    #[serde(default)]
    pub imports: Vec<ImportOutcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_rollout: Option<RolloutReport>,

    #[serde(default)]
    pub builds: Vec<BuildOutcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<PresenceRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<ApplyOutcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_rollout: Option<RolloutReport>,

    pub cancelled: bool,

    /// Reason the run stopped early, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,

    /// Failures that make the run unsuccessful.
    #[serde(default)]
    pub hard_failures: Vec<String>,
}

impl ReleaseSummary {
    /// Empty summary for a run that is about to start.
    pub fn begin(ctx: &RunContext, intent: IntentSet, catalog_digest: String) -> Self {
        let now = Utc::now();
        Self {
            run_id: ctx.run_id.to_string(),
            namespace: ctx.namespace.clone(),
            registry: ctx.registry.clone(),
            intent,
            catalog_digest,
            started_at: now,
            finished_at: now,
            imports: Vec::new(),
            seed_rollout: None,
            builds: Vec::new(),
            presence: None,
            manifest: None,
            app_rollout: None,
            cancelled: false,
            fatal: None,
            hard_failures: Vec::new(),
        }
    }

    /// True when no hard failure occurred and the run was not cancelled.
    ///
    /// Rollout failures never affect this.
    pub fn succeeded(&self) -> bool {
        !self.cancelled && self.fatal.is_none() && self.hard_failures.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            EXIT_CANCELLED
        } else if self.succeeded() {
            EXIT_SUCCESS
        } else {
            EXIT_FAILURE
        }
    }

    /// Whether the run performed no activity at all.
    pub fn is_noop(&self) -> bool {
        self.intent.is_empty()
    }

    /// Whether any import, build or rollout was left undone by cancellation.
    pub fn has_cancelled_entries(&self) -> bool {
        self.imports
            .iter()
            .any(|o| o.status == ImportStatus::Cancelled)
            || self
                .builds
                .iter()
                .any(|o| o.status == BuildStatus::Cancelled)
            || [&self.seed_rollout, &self.app_rollout]
                .into_iter()
                .flatten()
                .any(|r| r.outcomes.iter().any(|o| o.was_cancelled()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the summary as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Render the summary as plain text for the terminal.
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "Release {} -> {} (registry {})\n",
            self.run_id, self.namespace, self.registry
        );
        out.push_str(&format!(
            "intent: seed={} app={}\n",
            self.intent.seed_third_party, self.intent.build_first_party
        ));

        if self.is_noop() {
            out.push_str("\nNo release tag in trigger message; nothing to do.\n");
        }

        if self.intent.seed_third_party {
            out.push_str("\nImports\n");
            for import in &self.imports {
                let status = match &import.status {
                    ImportStatus::Imported { tags } => format!("imported as {}", tags.join(", ")),
                    ImportStatus::Skipped => "already present".to_string(),
                    ImportStatus::Failed { error } => format!("FAILED: {error}"),
                    ImportStatus::Cancelled => "cancelled".to_string(),
                };
                out.push_str(&format!("  {}:{}  {status}\n", import.name, import.version_tag));
            }
            if let Some(report) = &self.seed_rollout {
                render_rollout(&mut out, "Seed rollout", report);
            }
        }

        if self.intent.build_first_party {
            out.push_str("\nBuilds\n");
            for build in &self.builds {
                let status = match &build.status {
                    BuildStatus::Published { tags } => format!("published as {}", tags.join(", ")),
                    BuildStatus::Failed { error } => format!("FAILED: {error}"),
                    BuildStatus::Cancelled => "cancelled".to_string(),
                };
                out.push_str(&format!("  {}  {status}\n", build.name));
            }

            if let Some(presence) = &self.presence {
                let state = if presence.present { "present" } else { "absent" };
                out.push_str(&format!(
                    "\nPresence: {} in {} is {state}\n",
                    presence.workload, presence.namespace
                ));
            }

            if let Some(manifest) = &self.manifest {
                match &manifest.error {
                    None => out.push_str(&format!(
                        "Manifests: {} applied to {}{}\n",
                        manifest.applied.len(),
                        manifest.namespace,
                        if manifest.namespace_created {
                            " (namespace created)"
                        } else {
                            ""
                        }
                    )),
                    Some(error) => out.push_str(&format!("Manifests: FAILED: {error}\n")),
                }
            }

            if let Some(report) = &self.app_rollout {
                render_rollout(&mut out, "App rollout", report);
            }
        }

        out.push('\n');
        if let Some(fatal) = &self.fatal {
            out.push_str(&format!("Stopped: {fatal}\n"));
        }
        for failure in &self.hard_failures {
            out.push_str(&format!("Hard failure: {failure}\n"));
        }

        let verdict = if self.cancelled {
            "CANCELLED"
        } else if self.succeeded() {
            "SUCCESS"
        } else {
            "FAILED"
        };
        let elapsed = (self.finished_at - self.started_at).num_milliseconds();
        out.push_str(&format!("Result: {verdict} in {elapsed}ms\n"));
        out
    }
}

fn render_rollout(out: &mut String, title: &str, report: &RolloutReport) {
    out.push_str(&format!(
        "\n{title}: {} ready, {} not ready, {} failed, {} skipped\n",
        report.ready_count(),
        report.not_ready_count(),
        report.failed_count(),
        report.skipped_count()
    ));
    for outcome in &report.outcomes {
        let status = match &outcome.status {
            RolloutStatus::UpdatedReady => "ready".to_string(),
            RolloutStatus::UpdatedNotReady { error } => format!("not ready: {error}"),
            RolloutStatus::UpdateFailed { error } => format!("update failed: {error}"),
            RolloutStatus::Skipped { reason } => format!("skipped: {reason}"),
        };
        if outcome.image.is_empty() {
            out.push_str(&format!("  {}  {status}\n", outcome.workload));
        } else {
            out.push_str(&format!("  {} -> {}  {status}\n", outcome.workload, outcome.image));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RunIdentifier, WorkloadRef};

    fn summary(intent: IntentSet) -> ReleaseSummary {
        let ctx = RunContext::new(RunIdentifier::parse("812").unwrap(), "pets", "acr.io");
        ReleaseSummary::begin(&ctx, intent, "abc".to_string())
    }

    #[test]
    fn test_exit_codes() {
        let mut s = summary(IntentSet::default());
        assert_eq!(s.exit_code(), EXIT_SUCCESS);

        s.hard_failures.push("build order-service failed".to_string());
        assert_eq!(s.exit_code(), EXIT_FAILURE);

        s.cancelled = true;
        assert_eq!(s.exit_code(), EXIT_CANCELLED);
    }

    #[test]
    fn test_rollout_failures_do_not_fail_run() {
        let mut s = summary(crate::domain::parse_intent("[app]"));
        let mut report = RolloutReport::default();
        report.outcomes.push(crate::rollout::RolloutOutcome {
            workload: WorkloadRef::deployment("store-front", "store-front"),
            image: "acr.io/store-front:812".to_string(),
            restarted: false,
            status: RolloutStatus::UpdatedNotReady {
                error: "readiness: timed out".to_string(),
            },
        });
        s.app_rollout = Some(report);

        assert!(s.succeeded());
        assert!(s.render_text().contains("not ready: readiness: timed out"));
    }

    #[test]
    fn test_cancelled_entries_detected() {
        let mut s = summary(crate::domain::parse_intent("[app]"));
        s.builds.push(BuildOutcome {
            name: "order-service".to_string(),
            status: BuildStatus::Published {
                tags: vec!["812".to_string(), "latest".to_string()],
            },
            duration_ms: 5,
        });
        assert!(!s.has_cancelled_entries());

        let mut report = RolloutReport::default();
        report.push_skipped(
            WorkloadRef::deployment("order-service", "order-service"),
            crate::rollout::CANCELLED_REASON,
        );
        s.app_rollout = Some(report);
        assert!(s.has_cancelled_entries());
    }

    #[test]
    fn test_render_noop() {
        let text = summary(IntentSet::default()).render_text();
        assert!(text.contains("nothing to do"));
        assert!(text.contains("Result: SUCCESS"));
    }

    #[test]
    fn test_json_roundtrip_preserves_verdict() {
        let mut s = summary(crate::domain::parse_intent("[seed]"));
        s.fatal = Some("presence check failed".to_string());

        let json = s.to_json().unwrap();
        let back: ReleaseSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
        assert!(!back.succeeded());
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("release_summary.json");
        summary(IntentSet::default()).write_json(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"catalog_digest\": \"abc\""));
    }
}
