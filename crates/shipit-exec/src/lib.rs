//! shipit exec - collaborator adapters over external CLIs
//!
//! Implements the registry, build and cluster traits of `shipit-core` by
//! shelling out to `az acr` and `kubectl`. These adapters carry no release
//! logic: they translate one trait call into one command.

pub mod azure;
pub mod command;
pub mod kubectl;
pub mod runner;

#[cfg(test)]
pub(crate) mod scripted;

use std::sync::Arc;
use std::time::Duration;

use shipit_core::Collaborators;

// Re-export key types
pub use azure::{registry_name, AzureBuilder, AzureRegistry};
pub use command::CommandSpec;
pub use kubectl::KubectlCluster;
pub use runner::{run_checked, CommandExecutor, CommandOutput, ProcessExecutor};

/// Wire all three collaborators to real processes.
pub fn process_collaborators(
    registry_address: &str,
    command_timeout: Duration,
    kube_context: Option<&str>,
) -> Collaborators {
    let executor: Arc<dyn CommandExecutor> = Arc::new(ProcessExecutor::new(command_timeout));

    let mut cluster = KubectlCluster::new(executor.clone());
    if let Some(context) = kube_context {
        cluster = cluster.with_context(context);
    }

    Collaborators {
        registry: Arc::new(AzureRegistry::new(executor.clone(), registry_address)),
        builder: Arc::new(AzureBuilder::new(executor, registry_address)),
        cluster: Arc::new(cluster),
    }
}
