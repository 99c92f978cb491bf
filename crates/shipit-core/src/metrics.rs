//! Global atomic counters for release observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a run).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::builder::BuildOutcome;
use crate::importer::{ImportOutcome, ImportStatus};
use crate::rollout::{RolloutReport, RolloutStatus};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters; no allocation or locking.
pub struct Metrics {
    images_imported: AtomicU64,
    images_skipped: AtomicU64,
    imports_failed: AtomicU64,
    builds_published: AtomicU64,
    builds_failed: AtomicU64,
    rollouts_ready: AtomicU64,
    rollouts_not_ready: AtomicU64,
    rollouts_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            images_imported: AtomicU64::new(0),
            images_skipped: AtomicU64::new(0),
            imports_failed: AtomicU64::new(0),
            builds_published: AtomicU64::new(0),
            builds_failed: AtomicU64::new(0),
            rollouts_ready: AtomicU64::new(0),
            rollouts_not_ready: AtomicU64::new(0),
            rollouts_failed: AtomicU64::new(0),
        }
    }

    pub fn record_import(&self, outcome: &ImportOutcome) {
        let counter = match outcome.status {
            ImportStatus::Imported { .. } => &self.images_imported,
            ImportStatus::Skipped => &self.images_skipped,
            ImportStatus::Failed { .. } => &self.imports_failed,
            ImportStatus::Cancelled => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_build(&self, outcome: &BuildOutcome) {
        if outcome.is_published() {
            self.builds_published.fetch_add(1, Ordering::Relaxed);
        } else if outcome.is_failed() {
            self.builds_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rollout(&self, report: &RolloutReport) {
        for outcome in &report.outcomes {
            let counter = match outcome.status {
                RolloutStatus::UpdatedReady => &self.rollouts_ready,
                RolloutStatus::UpdatedNotReady { .. } => &self.rollouts_not_ready,
                RolloutStatus::UpdateFailed { .. } => &self.rollouts_failed,
                RolloutStatus::Skipped { .. } => continue,
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn images_imported(&self) -> u64 {
        self.images_imported.load(Ordering::Relaxed)
    }

    pub fn builds_published(&self) -> u64 {
        self.builds_published.load(Ordering::Relaxed)
    }

    pub fn rollouts_failed(&self) -> u64 {
        self.rollouts_failed.load(Ordering::Relaxed)
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            images_imported = self.images_imported(),
            images_skipped = self.images_skipped.load(Ordering::Relaxed),
            imports_failed = self.imports_failed.load(Ordering::Relaxed),
            builds_published = self.builds_published(),
            builds_failed = self.builds_failed.load(Ordering::Relaxed),
            rollouts_ready = self.rollouts_ready.load(Ordering::Relaxed),
            rollouts_not_ready = self.rollouts_not_ready.load(Ordering::Relaxed),
            rollouts_failed = self.rollouts_failed(),
            "release metrics"
        );
    }
}
