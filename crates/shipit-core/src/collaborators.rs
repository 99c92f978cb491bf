//! Collaborator trait definitions.
//!
//! These traits define the external systems the orchestrator drives:
//! - `Registry`: Tag listing and image import for the target registry
//! - `ImageBuild`: Build-and-push of a source context
//! - `Cluster`: Namespace, manifest and workload operations
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module; process-backed implementations live in
//! the `shipit-exec` crate.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use crate::domain::catalog::WorkloadRef;
use crate::domain::error::CollaboratorResult;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Target container registry.
///
/// Guarantees:
/// - `list_tags` of a repository that does not exist is an empty set, not an error.
/// - `import_image` publishes every requested tag or fails.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Tags currently published under `name`.
    async fn list_tags(&self, name: &str) -> CollaboratorResult<BTreeSet<String>>;

    /// Import `source` into repository `name` under each of `tags`.
    async fn import_image(&self, source: &str, name: &str, tags: &[String])
        -> CollaboratorResult<()>;
}

// ---------------------------------------------------------------------------
// ImageBuild
// ---------------------------------------------------------------------------

/// Builds a source context and pushes the result to the target registry.
#[async_trait]
pub trait ImageBuild: Send + Sync {
    /// Build `context` and publish it as `name` under each of `tags`.
    async fn build(&self, context: &Path, name: &str, tags: &[String]) -> CollaboratorResult<()>;
}

// ---------------------------------------------------------------------------
// Cluster
// ---------------------------------------------------------------------------

/// Orchestration target hosting the application's workloads.
///
/// Existence queries answer `Ok(false)` for absent objects; an `Err` always
/// means the question could not be answered.
#[async_trait]
pub trait Cluster: Send + Sync {
    async fn namespace_exists(&self, namespace: &str) -> CollaboratorResult<bool>;

    async fn create_namespace(&self, namespace: &str) -> CollaboratorResult<()>;

    async fn workload_exists(&self, workload: &WorkloadRef, namespace: &str)
        -> CollaboratorResult<bool>;

    async fn apply_manifest(&self, path: &Path, namespace: &str) -> CollaboratorResult<()>;

    /// Point the workload's named container at `image`.
    async fn set_image(
        &self,
        workload: &WorkloadRef,
        namespace: &str,
        image: &str,
    ) -> CollaboratorResult<()>;

    /// Trigger a rolling restart of the workload's pods.
    async fn restart(&self, workload: &WorkloadRef, namespace: &str) -> CollaboratorResult<()>;

    /// Block until the workload's rollout completes or `timeout` elapses.
    async fn wait_ready(
        &self,
        workload: &WorkloadRef,
        namespace: &str,
        timeout: Duration,
    ) -> CollaboratorResult<()>;
}
