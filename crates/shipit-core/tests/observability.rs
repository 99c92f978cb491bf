//! Observability tests for the release lifecycle.
//!
//! These verify that the structured events a run is expected to emit
//! actually reach the subscriber.

use std::sync::Arc;

use shipit_core::fakes::{MemoryBuilder, MemoryCluster, MemoryRegistry};
use shipit_core::obs::{emit_intent, emit_release_started, release_span};
use shipit_core::{
    parse_intent, Cancellation, Collaborators, ReleaseOrchestrator, RunContext, RunIdentifier,
    ShipitConfig,
};
use tracing::Instrument;
use tracing_test::traced_test;

#[traced_test]
#[test]
fn emit_release_started_logs_target() {
    emit_release_started("run-123", "pets", "acr.io");
    assert!(logs_contain("release.started"));
    assert!(logs_contain("run-123"));
}

#[traced_test]
#[test]
fn emit_intent_logs_flags() {
    emit_intent(&parse_intent("hotfix [app]"));
    assert!(logs_contain("release.intent"));
    assert!(logs_contain("build_first_party=true"));
}

#[traced_test]
#[tokio::test]
async fn release_span_carries_run_id() {
    async { tracing::info!("inside") }
        .instrument(release_span("span-run-7"))
        .await;
    assert!(logs_contain("span-run-7"));
}

#[traced_test]
#[tokio::test]
async fn full_run_emits_lifecycle_events() {
    let registry = Arc::new(MemoryRegistry::new());
    let builder = Arc::new(MemoryBuilder::new(registry.clone()));
    let cluster = Arc::new(MemoryCluster::new());
    cluster.fail_wait("store-front");

    let mut config = ShipitConfig::default();
    config.target.registry = "acr.io".to_string();
    let orchestrator = ReleaseOrchestrator::new(
        Collaborators {
            registry,
            builder,
            cluster,
        },
        &config,
    );
    let ctx = RunContext::new(RunIdentifier::parse("901").unwrap(), "pets", "acr.io");

    orchestrator
        .run("[seed] [app]", &ctx, &Cancellation::never())
        .await;

    for event in [
        "release.started",
        "release.intent",
        "import.outcome",
        "build.outcome",
        "presence.checked",
        "manifest.applied",
        "rollout.outcome",
        "release.finished",
    ] {
        assert!(logs_contain(event), "missing {event}");
    }
    assert!(logs_contain("release metrics"));
}
