//! Registry and build adapters backed by the Azure CLI (`az acr ...`).

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use shipit_core::{CollaboratorError, CollaboratorResult, ImageBuild, Registry};

use crate::command::CommandSpec;
use crate::runner::{run_checked, CommandExecutor};

/// Registry name as `az acr` expects it: the first label of the address
/// (`myacr.azurecr.io` -> `myacr`).
pub fn registry_name(address: &str) -> &str {
    address
        .trim_end_matches('/')
        .split('.')
        .next()
        .unwrap_or(address)
}

/// Whether `az` reported that `repository` itself does not exist yet.
///
/// Other "not found" errors (subscription, registry, resource group) are
/// failures of the query and must not read as an empty repository.
fn is_repository_missing(stderr: &str, repository: &str) -> bool {
    if stderr.contains("RepositoryNotFound") {
        return true;
    }
    let needle = format!("repository '{repository}' is not found");
    stderr.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}

fn image_args(name: &str, tags: &[String]) -> Vec<String> {
    tags.iter()
        .flat_map(|tag| ["--image".to_string(), format!("{name}:{tag}")])
        .collect()
}

/// [`Registry`] over `az acr repository show-tags` and `az acr import`.
pub struct AzureRegistry {
    executor: Arc<dyn CommandExecutor>,
    registry: String,
}

impl AzureRegistry {
    pub fn new(executor: Arc<dyn CommandExecutor>, registry_address: &str) -> Self {
        Self {
            executor,
            registry: registry_name(registry_address).to_string(),
        }
    }
}

#[async_trait]
impl Registry for AzureRegistry {
    async fn list_tags(&self, name: &str) -> CollaboratorResult<BTreeSet<String>> {
        let spec = CommandSpec::az().args([
            "acr",
            "repository",
            "show-tags",
            "--name",
            self.registry.as_str(),
            "--repository",
            name,
            "--output",
            "json",
        ]);

        let output = self.executor.execute(&spec).await?;
        if !output.success() {
            if is_repository_missing(&output.stderr, name) {
                debug!(repository = %name, "repository not found, no tags");
                return Ok(BTreeSet::new());
            }
            return Err(CollaboratorError::CommandFailed {
                command: spec.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        if output.stdout.trim().is_empty() {
            return Ok(BTreeSet::new());
        }
        let tags: Vec<String> =
            serde_json::from_str(&output.stdout).map_err(|e| CollaboratorError::InvalidOutput {
                command: spec.to_string(),
                reason: e.to_string(),
            })?;
        Ok(tags.into_iter().collect())
    }

    async fn import_image(
        &self,
        source: &str,
        name: &str,
        tags: &[String],
    ) -> CollaboratorResult<()> {
        // `--force` lets the floating tag move to the newly imported digest.
        let spec = CommandSpec::az()
            .args(["acr", "import", "--name", self.registry.as_str(), "--source", source])
            .args(image_args(name, tags))
            .arg("--force");
        run_checked(self.executor.as_ref(), &spec).await?;
        Ok(())
    }
}

/// [`ImageBuild`] over `az acr build`, which builds remotely and pushes
/// every requested tag in one step.
pub struct AzureBuilder {
    executor: Arc<dyn CommandExecutor>,
    registry: String,
}

impl AzureBuilder {
    pub fn new(executor: Arc<dyn CommandExecutor>, registry_address: &str) -> Self {
        Self {
            executor,
            registry: registry_name(registry_address).to_string(),
        }
    }
}

#[async_trait]
impl ImageBuild for AzureBuilder {
    async fn build(&self, context: &Path, name: &str, tags: &[String]) -> CollaboratorResult<()> {
        let spec = CommandSpec::az()
            .args(["acr", "build", "--registry", self.registry.as_str()])
            .args(image_args(name, tags))
            .arg(context.display().to_string());
        run_checked(self.executor.as_ref(), &spec).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedExecutor;

    fn scripted() -> Arc<ScriptedExecutor> {
        Arc::new(ScriptedExecutor::new())
    }

    #[test]
    fn test_registry_name_from_address() {
        assert_eq!(registry_name("myacr.azurecr.io"), "myacr");
        assert_eq!(registry_name("myacr.azurecr.io/"), "myacr");
        assert_eq!(registry_name("myacr"), "myacr");
    }

    #[tokio::test]
    async fn test_list_tags_parses_json() {
        let exec = scripted();
        exec.respond(
            "az acr repository show-tags",
            0,
            r#"["3.11", "3.12-management", "latest"]"#,
            "",
        );
        let registry = AzureRegistry::new(exec.clone(), "myacr.azurecr.io");

        let tags = registry.list_tags("rabbitmq").await.unwrap();
        assert!(tags.contains("3.12-management"));
        assert_eq!(tags.len(), 3);
        assert_eq!(
            exec.commands(),
            vec![
                "az acr repository show-tags --name myacr --repository rabbitmq --output json"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_repository_is_empty() {
        let exec = scripted();
        exec.respond(
            "az acr repository show-tags",
            1,
            "",
            "ERROR: (RepositoryNotFound) The repository 'mongo' is not found.",
        );
        let registry = AzureRegistry::new(exec, "myacr.azurecr.io");

        assert!(registry.list_tags("mongo").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auth_failure_is_error() {
        let exec = scripted();
        exec.respond(
            "az acr repository show-tags",
            1,
            "",
            "ERROR: Please run 'az login' to setup account.",
        );
        let registry = AzureRegistry::new(exec, "myacr.azurecr.io");

        assert!(matches!(
            registry.list_tags("mongo").await,
            Err(CollaboratorError::CommandFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_other_not_found_errors_are_failures() {
        for stderr in [
            "ERROR: Subscription 'abc' not found. Check the spelling and casing and try again.",
            "ERROR: The resource with name 'myacr' and type \
             'Microsoft.ContainerRegistry/registries' could not be found.",
            "ERROR: Registry 'myacr' not found.",
        ] {
            let exec = scripted();
            exec.respond("az acr repository show-tags", 1, "", stderr);
            let registry = AzureRegistry::new(exec, "myacr.azurecr.io");

            assert!(
                matches!(
                    registry.list_tags("mongo").await,
                    Err(CollaboratorError::CommandFailed { .. })
                ),
                "{stderr}"
            );
        }
    }

    #[test]
    fn test_repository_missing_matches_named_repository_only() {
        assert!(is_repository_missing(
            "ERROR: The repository 'mongo' is not found.",
            "mongo"
        ));
        assert!(!is_repository_missing(
            "ERROR: The repository 'mongo' is not found.",
            "rabbitmq"
        ));
        assert!(!is_repository_missing("ERROR: Subscription 'abc' not found.", "mongo"));
    }

    #[tokio::test]
    async fn test_garbage_output_is_invalid() {
        let exec = scripted();
        exec.respond("az acr repository show-tags", 0, "<html>", "");
        let registry = AzureRegistry::new(exec, "myacr.azurecr.io");

        assert!(matches!(
            registry.list_tags("mongo").await,
            Err(CollaboratorError::InvalidOutput { .. })
        ));
    }

    #[tokio::test]
    async fn test_import_passes_every_tag() {
        let exec = scripted();
        let registry = AzureRegistry::new(exec.clone(), "myacr.azurecr.io");

        registry
            .import_image(
                "docker.io/library/mongo:6",
                "mongo",
                &["6".to_string(), "latest".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(
            exec.commands(),
            vec![
                "az acr import --name myacr --source docker.io/library/mongo:6 \
                 --image mongo:6 --image mongo:latest --force"
            ]
        );
    }

    #[tokio::test]
    async fn test_build_publishes_both_tags() {
        let exec = scripted();
        let builder = AzureBuilder::new(exec.clone(), "myacr.azurecr.io");

        builder
            .build(
                Path::new("src/store-front"),
                "store-front",
                &["812".to_string(), "latest".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(
            exec.commands(),
            vec![
                "az acr build --registry myacr --image store-front:812 \
                 --image store-front:latest src/store-front"
            ]
        );
    }

    #[tokio::test]
    async fn test_build_failure_propagates() {
        let exec = scripted();
        exec.respond("az acr build", 1, "", "Step 3/9 failed");
        let builder = AzureBuilder::new(exec, "myacr.azurecr.io");

        let err = builder
            .build(Path::new("src/store-admin"), "store-admin", &["1".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Step 3/9 failed"));
    }
}
