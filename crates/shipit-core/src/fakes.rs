//! In-memory fakes for collaborator traits (testing only)
//!
//! Provides `MemoryRegistry`, `MemoryBuilder`, and `MemoryCluster` that
//! satisfy the trait contracts without any external tools. Each fake keeps a
//! journal of the calls it received and supports per-name failure injection.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::collaborators::{Cluster, ImageBuild, Registry};
use crate::domain::catalog::WorkloadRef;
use crate::domain::error::{CollaboratorError, CollaboratorResult};

type Hook = Box<dyn Fn(&str) + Send + Sync>;

fn rejected(msg: String) -> CollaboratorError {
    CollaboratorError::Rejected(msg)
}

// ---------------------------------------------------------------------------
// MemoryRegistry
// ---------------------------------------------------------------------------

/// In-memory registry backed by a `HashMap<repository, tags>`.
#[derive(Default)]
pub struct MemoryRegistry {
    repos: Mutex<HashMap<String, BTreeSet<String>>>,
    journal: Mutex<Vec<String>>,
    failing_queries: Mutex<HashSet<String>>,
    failing_imports: Mutex<HashSet<String>>,
    import_hook: Mutex<Option<Hook>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a repository with tags.
    pub fn with_tags(self, name: &str, tags: &[&str]) -> Self {
        self.publish(name, tags.iter().map(|t| t.to_string()));
        self
    }

    /// Make `list_tags(name)` fail.
    pub fn fail_query(&self, name: &str) {
        self.failing_queries.lock().unwrap().insert(name.to_string());
    }

    /// Make `import_image(.., name, ..)` fail.
    pub fn fail_import(&self, name: &str) {
        self.failing_imports.lock().unwrap().insert(name.to_string());
    }

    /// Run `hook(name)` after every successful import.
    pub fn on_import(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        *self.import_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Tags currently published under `name` (empty when absent).
    pub fn tags(&self, name: &str) -> BTreeSet<String> {
        self.repos
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Write calls (`import ...`) received so far, in order.
    pub fn writes(&self) -> Vec<String> {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|c| !c.starts_with("list_tags"))
            .cloned()
            .collect()
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    fn publish(&self, name: &str, tags: impl IntoIterator<Item = String>) {
        self.repos
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .extend(tags);
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn list_tags(&self, name: &str) -> CollaboratorResult<BTreeSet<String>> {
        self.journal.lock().unwrap().push(format!("list_tags {name}"));
        if self.failing_queries.lock().unwrap().contains(name) {
            return Err(rejected(format!("registry unavailable while listing {name}")));
        }
        Ok(self.tags(name))
    }

    async fn import_image(
        &self,
        source: &str,
        name: &str,
        tags: &[String],
    ) -> CollaboratorResult<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("import {source} -> {name}:{}", tags.join(",")));
        if self.failing_imports.lock().unwrap().contains(name) {
            return Err(rejected(format!("upstream {source} could not be pulled")));
        }
        self.publish(name, tags.iter().cloned());
        if let Some(hook) = self.import_hook.lock().unwrap().as_ref() {
            hook(name);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryBuilder
// ---------------------------------------------------------------------------

/// In-memory builder that publishes into a shared [`MemoryRegistry`].
pub struct MemoryBuilder {
    registry: Arc<MemoryRegistry>,
    journal: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    partial: Mutex<HashSet<String>>,
}

impl MemoryBuilder {
    pub fn new(registry: Arc<MemoryRegistry>) -> Self {
        Self {
            registry,
            journal: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            partial: Mutex::new(HashSet::new()),
        }
    }

    /// Make the build of `name` fail without publishing anything.
    pub fn fail_build(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    /// Report success for `name` but publish only the first requested tag.
    pub fn publish_first_tag_only(&self, name: &str) {
        self.partial.lock().unwrap().insert(name.to_string());
    }

    /// Build calls received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageBuild for MemoryBuilder {
    async fn build(&self, context: &Path, name: &str, tags: &[String]) -> CollaboratorResult<()> {
        self.journal.lock().unwrap().push(format!(
            "build {} -> {name}:{}",
            context.display(),
            tags.join(",")
        ));
        if self.failing.lock().unwrap().contains(name) {
            return Err(rejected(format!("build of {name} failed")));
        }
        if self.partial.lock().unwrap().contains(name) {
            self.registry.publish(name, tags.iter().take(1).cloned());
        } else {
            self.registry.publish(name, tags.iter().cloned());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryCluster
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ClusterState {
    namespaces: HashSet<String>,
    /// (namespace, "kind/name") -> current image
    workloads: HashMap<(String, String), Option<String>>,
    manifests: HashMap<PathBuf, Vec<WorkloadRef>>,
    restarts: Vec<String>,
}

/// In-memory cluster holding namespaces and workload image references.
#[derive(Default)]
pub struct MemoryCluster {
    state: Mutex<ClusterState>,
    journal: Mutex<Vec<String>>,
    unreachable: Mutex<bool>,
    failing_apply: Mutex<bool>,
    failing_set_image: Mutex<HashSet<String>>,
    failing_restart: Mutex<HashSet<String>>,
    failing_wait: Mutex<HashSet<String>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the workloads a manifest creates when applied.
    pub fn with_manifest(self, path: impl Into<PathBuf>, workloads: Vec<WorkloadRef>) -> Self {
        self.state
            .lock()
            .unwrap()
            .manifests
            .insert(path.into(), workloads);
        self
    }

    /// Pre-create a namespace and workloads, as after an earlier deployment.
    pub fn with_workloads(self, namespace: &str, workloads: &[WorkloadRef]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.namespaces.insert(namespace.to_string());
            for w in workloads {
                state
                    .workloads
                    .insert((namespace.to_string(), w.to_string()), None);
            }
        }
        self
    }

    /// Make every call fail as if credentials or connectivity were broken.
    pub fn set_unreachable(&self) {
        *self.unreachable.lock().unwrap() = true;
    }

    pub fn fail_apply(&self) {
        *self.failing_apply.lock().unwrap() = true;
    }

    pub fn fail_set_image(&self, workload: &str) {
        self.failing_set_image
            .lock()
            .unwrap()
            .insert(workload.to_string());
    }

    pub fn fail_restart(&self, workload: &str) {
        self.failing_restart
            .lock()
            .unwrap()
            .insert(workload.to_string());
    }

    pub fn fail_wait(&self, workload: &str) {
        self.failing_wait.lock().unwrap().insert(workload.to_string());
    }

    /// Current image of a workload, if it exists and has been updated.
    pub fn image_of(&self, namespace: &str, workload: &WorkloadRef) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .workloads
            .get(&(namespace.to_string(), workload.to_string()))
            .cloned()
            .flatten()
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.state.lock().unwrap().namespaces.contains(namespace)
    }

    /// Workloads restarted so far, as `kind/name`.
    pub fn restarts(&self) -> Vec<String> {
        self.state.lock().unwrap().restarts.clone()
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    /// Calls whose journal entry starts with `op`.
    pub fn calls_to(&self, op: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split_whitespace().next() == Some(op))
            .collect()
    }

    fn record(&self, call: String) -> CollaboratorResult<()> {
        self.journal.lock().unwrap().push(call);
        if *self.unreachable.lock().unwrap() {
            return Err(rejected("cluster unreachable: Unauthorized".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Cluster for MemoryCluster {
    async fn namespace_exists(&self, namespace: &str) -> CollaboratorResult<bool> {
        self.record(format!("namespace_exists {namespace}"))?;
        Ok(self.has_namespace(namespace))
    }

    async fn create_namespace(&self, namespace: &str) -> CollaboratorResult<()> {
        self.record(format!("create_namespace {namespace}"))?;
        let mut state = self.state.lock().unwrap();
        if !state.namespaces.insert(namespace.to_string()) {
            return Err(rejected(format!("namespace {namespace} already exists")));
        }
        Ok(())
    }

    async fn workload_exists(
        &self,
        workload: &WorkloadRef,
        namespace: &str,
    ) -> CollaboratorResult<bool> {
        self.record(format!("workload_exists {workload} -n {namespace}"))?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .workloads
            .contains_key(&(namespace.to_string(), workload.to_string())))
    }

    async fn apply_manifest(&self, path: &Path, namespace: &str) -> CollaboratorResult<()> {
        self.record(format!("apply_manifest {} -n {namespace}", path.display()))?;
        if *self.failing_apply.lock().unwrap() {
            return Err(rejected(format!("invalid manifest {}", path.display())));
        }
        let mut state = self.state.lock().unwrap();
        if !state.namespaces.contains(namespace) {
            return Err(rejected(format!("namespace {namespace} not found")));
        }
        let created = state.manifests.get(path).cloned().unwrap_or_default();
        for w in created {
            state
                .workloads
                .entry((namespace.to_string(), w.to_string()))
                .or_insert(None);
        }
        Ok(())
    }

    async fn set_image(
        &self,
        workload: &WorkloadRef,
        namespace: &str,
        image: &str,
    ) -> CollaboratorResult<()> {
        self.record(format!(
            "set_image {workload} {}={image} -n {namespace}",
            workload.container
        ))?;
        if self.failing_set_image.lock().unwrap().contains(&workload.name) {
            return Err(rejected(format!("container {} not found", workload.container)));
        }
        let mut state = self.state.lock().unwrap();
        match state
            .workloads
            .get_mut(&(namespace.to_string(), workload.to_string()))
        {
            Some(current) => {
                *current = Some(image.to_string());
                Ok(())
            }
            None => Err(rejected(format!("{workload} not found in {namespace}"))),
        }
    }

    async fn restart(&self, workload: &WorkloadRef, namespace: &str) -> CollaboratorResult<()> {
        self.record(format!("restart {workload} -n {namespace}"))?;
        if self.failing_restart.lock().unwrap().contains(&workload.name) {
            return Err(rejected(format!("restart of {workload} rejected")));
        }
        self.state.lock().unwrap().restarts.push(workload.to_string());
        Ok(())
    }

    async fn wait_ready(
        &self,
        workload: &WorkloadRef,
        namespace: &str,
        timeout: Duration,
    ) -> CollaboratorResult<()> {
        self.record(format!("wait_ready {workload} -n {namespace}"))?;
        if self.failing_wait.lock().unwrap().contains(&workload.name) {
            return Err(CollaboratorError::Timeout {
                command: format!("rollout status {workload}"),
                timeout,
            });
        }
        Ok(())
    }
}
