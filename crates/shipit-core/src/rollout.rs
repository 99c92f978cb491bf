//! Best-effort rollout of workloads onto new image references.
//!
//! Every set-image, restart and readiness wait is attempted independently.
//! A failure is recorded against its workload and the batch moves on; nothing
//! in this module can fail the enclosing run.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cancel::Cancellation;
use crate::collaborators::Cluster;
use crate::domain::catalog::WorkloadRef;

/// Skip reason for workloads not started because the run was cancelled.
pub const CANCELLED_REASON: &str = "run cancelled";

const WAIT_CANCELLED: &str = "run cancelled before readiness wait";

/// A requested image change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadUpdate {
    pub workload: WorkloadRef,
    pub image: String,
}

/// Final state of one workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RolloutStatus {
    /// Image updated and the rollout completed.
    UpdatedReady,

    /// Image updated, but restart or readiness did not succeed.
    UpdatedNotReady { error: String },

    /// The image reference could not be changed.
    UpdateFailed { error: String },

    /// Deliberately not touched.
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RolloutOutcome {
    pub workload: WorkloadRef,

    /// Target image reference; empty when no image was available.
    pub image: String,

    /// Whether an explicit restart was issued successfully.
    pub restarted: bool,

    #[serde(flatten)]
    pub status: RolloutStatus,
}

impl RolloutOutcome {
    /// Whether cancellation cut this workload's rollout short.
    pub fn was_cancelled(&self) -> bool {
        match &self.status {
            RolloutStatus::Skipped { reason } => reason == CANCELLED_REASON,
            RolloutStatus::UpdatedNotReady { error } => error.ends_with(WAIT_CANCELLED),
            _ => false,
        }
    }
}

/// Per-workload results of one rollout batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RolloutReport {
    pub outcomes: Vec<RolloutOutcome>,
}

impl RolloutReport {
    pub fn ready_count(&self) -> usize {
        self.count(|s| matches!(s, RolloutStatus::UpdatedReady))
    }

    pub fn not_ready_count(&self) -> usize {
        self.count(|s| matches!(s, RolloutStatus::UpdatedNotReady { .. }))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|s| matches!(s, RolloutStatus::UpdateFailed { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|s| matches!(s, RolloutStatus::Skipped { .. }))
    }

    /// Whether every workload in the batch is updated and ready.
    pub fn all_ready(&self) -> bool {
        self.ready_count() == self.outcomes.len()
    }

    /// Record a workload that was deliberately left alone.
    pub fn push_skipped(&mut self, workload: WorkloadRef, reason: impl Into<String>) {
        self.outcomes.push(RolloutOutcome {
            workload,
            image: String::new(),
            restarted: false,
            status: RolloutStatus::Skipped {
                reason: reason.into(),
            },
        });
    }

    /// Outcome for the named workload, if it was part of the batch.
    pub fn get(&self, workload_name: &str) -> Option<&RolloutOutcome> {
        self.outcomes.iter().find(|o| o.workload.name == workload_name)
    }

    fn count(&self, pred: impl Fn(&RolloutStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Result of the update phase for one workload.
enum Updated {
    Done {
        restarted: bool,
        restart_error: Option<String>,
    },
    Failed(String),
    Cancelled,
}

/// Drives image updates, restarts and readiness waits against the cluster.
pub struct RolloutController {
    cluster: Arc<dyn Cluster>,
    timeout: Duration,
}

impl RolloutController {
    pub fn new(cluster: Arc<dyn Cluster>, timeout: Duration) -> Self {
        Self { cluster, timeout }
    }

    /// Update every workload, then wait for each updated one to become ready.
    pub async fn rollout(
        &self,
        updates: &[WorkloadUpdate],
        namespace: &str,
        cancel: &Cancellation,
    ) -> RolloutReport {
        let mut updated = Vec::with_capacity(updates.len());
        for update in updates {
            updated.push(self.update(update, namespace, cancel).await);
        }

        let mut report = RolloutReport::default();
        for (update, state) in updates.iter().zip(updated) {
            let (restarted, status) = match state {
                Updated::Cancelled => (
                    false,
                    RolloutStatus::Skipped {
                        reason: CANCELLED_REASON.to_string(),
                    },
                ),
                Updated::Failed(error) => (false, RolloutStatus::UpdateFailed { error }),
                Updated::Done {
                    restarted,
                    restart_error,
                } => (
                    restarted,
                    self.await_ready(&update.workload, namespace, restart_error, cancel)
                        .await,
                ),
            };

            match &status {
                RolloutStatus::UpdatedReady => {
                    info!(workload = %update.workload, image = %update.image, "rollout ready")
                }
                other => warn!(workload = %update.workload, status = ?other, "rollout incomplete"),
            }

            report.outcomes.push(RolloutOutcome {
                workload: update.workload.clone(),
                image: update.image.clone(),
                restarted,
                status,
            });
        }

        report
    }

    async fn update(&self, update: &WorkloadUpdate, namespace: &str, cancel: &Cancellation) -> Updated {
        if cancel.is_cancelled() {
            return Updated::Cancelled;
        }

        if let Err(e) = self
            .cluster
            .set_image(&update.workload, namespace, &update.image)
            .await
        {
            return Updated::Failed(format!("set image: {e}"));
        }

        if !update.workload.kind.requires_explicit_restart() {
            return Updated::Done {
                restarted: false,
                restart_error: None,
            };
        }

        match self.cluster.restart(&update.workload, namespace).await {
            Ok(()) => Updated::Done {
                restarted: true,
                restart_error: None,
            },
            Err(e) => Updated::Done {
                restarted: false,
                restart_error: Some(format!("restart: {e}")),
            },
        }
    }

    async fn await_ready(
        &self,
        workload: &WorkloadRef,
        namespace: &str,
        restart_error: Option<String>,
        cancel: &Cancellation,
    ) -> RolloutStatus {
        if cancel.is_cancelled() {
            let mut error = WAIT_CANCELLED.to_string();
            if let Some(restart) = restart_error {
                error = format!("{restart}; {error}");
            }
            return RolloutStatus::UpdatedNotReady { error };
        }

        let wait = self.cluster.wait_ready(workload, namespace, self.timeout).await;
        match (restart_error, wait) {
            (None, Ok(())) => RolloutStatus::UpdatedReady,
            (Some(restart), Ok(())) => RolloutStatus::UpdatedNotReady { error: restart },
            (None, Err(e)) => RolloutStatus::UpdatedNotReady {
                error: format!("readiness: {e}"),
            },
            (Some(restart), Err(e)) => RolloutStatus::UpdatedNotReady {
                error: format!("{restart}; readiness: {e}"),
            },
        }
    }
}
