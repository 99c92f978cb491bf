//! Cluster adapter backed by `kubectl`.
//!
//! Presence queries use `get --ignore-not-found -o name`: an absent object is
//! an empty answer with exit code 0, so any non-zero exit (credentials,
//! connectivity, unknown context) stays an error instead of reading as absence.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use shipit_core::{CollaboratorResult, Cluster, WorkloadRef};

use crate::command::CommandSpec;
use crate::runner::{run_checked, CommandExecutor};

/// Slack given to the process on top of kubectl's own rollout timeout.
const WAIT_GRACE: Duration = Duration::from_secs(30);

pub struct KubectlCluster {
    executor: Arc<dyn CommandExecutor>,
    context: Option<String>,
}

impl KubectlCluster {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            context: None,
        }
    }

    /// Target a specific kubeconfig context instead of the current one.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn kubectl(&self) -> CommandSpec {
        match &self.context {
            Some(context) => CommandSpec::kubectl().arg("--context").arg(context.as_str()),
            None => CommandSpec::kubectl(),
        }
    }

    async fn exists(&self, spec: CommandSpec) -> CollaboratorResult<bool> {
        let output = run_checked(self.executor.as_ref(), &spec).await?;
        Ok(!output.stdout.trim().is_empty())
    }
}

fn resource(workload: &WorkloadRef) -> String {
    workload.to_string()
}

#[async_trait]
impl Cluster for KubectlCluster {
    async fn namespace_exists(&self, namespace: &str) -> CollaboratorResult<bool> {
        let spec = self
            .kubectl()
            .args(["get", "namespace", namespace, "--ignore-not-found", "-o", "name"]);
        self.exists(spec).await
    }

    async fn create_namespace(&self, namespace: &str) -> CollaboratorResult<()> {
        let spec = self.kubectl().args(["create", "namespace", namespace]);
        run_checked(self.executor.as_ref(), &spec).await?;
        Ok(())
    }

    async fn workload_exists(
        &self,
        workload: &WorkloadRef,
        namespace: &str,
    ) -> CollaboratorResult<bool> {
        let spec = self.kubectl().args([
            "get",
            workload.kind.as_str(),
            workload.name.as_str(),
            "-n",
            namespace,
            "--ignore-not-found",
            "-o",
            "name",
        ]);
        self.exists(spec).await
    }

    async fn apply_manifest(&self, path: &Path, namespace: &str) -> CollaboratorResult<()> {
        let spec = self
            .kubectl()
            .args(["apply", "-f"])
            .arg(path.display().to_string())
            .args(["-n", namespace]);
        run_checked(self.executor.as_ref(), &spec).await?;
        Ok(())
    }

    async fn set_image(
        &self,
        workload: &WorkloadRef,
        namespace: &str,
        image: &str,
    ) -> CollaboratorResult<()> {
        let spec = self
            .kubectl()
            .args(["set", "image"])
            .arg(resource(workload))
            .arg(format!("{}={image}", workload.container))
            .args(["-n", namespace]);
        run_checked(self.executor.as_ref(), &spec).await?;
        Ok(())
    }

    async fn restart(&self, workload: &WorkloadRef, namespace: &str) -> CollaboratorResult<()> {
        let spec = self
            .kubectl()
            .args(["rollout", "restart"])
            .arg(resource(workload))
            .args(["-n", namespace]);
        run_checked(self.executor.as_ref(), &spec).await?;
        Ok(())
    }

    async fn wait_ready(
        &self,
        workload: &WorkloadRef,
        namespace: &str,
        timeout: Duration,
    ) -> CollaboratorResult<()> {
        let spec = self
            .kubectl()
            .args(["rollout", "status"])
            .arg(resource(workload))
            .args(["-n", namespace])
            .arg(format!("--timeout={}s", timeout.as_secs()))
            .timeout(timeout + WAIT_GRACE);
        run_checked(self.executor.as_ref(), &spec).await?;
        Ok(())
    }
}
