//! Dry evaluation of a trigger message.
//!
//! [`plan_release`] lists the activities a run would perform, in order,
//! without contacting any collaborator. Conditional steps (manifest apply,
//! per-entry imports) are shown with their condition since the answer is only
//! known at run time.

use std::fmt;
use std::path::PathBuf;

use crate::builder::ImageBuilder;
use crate::domain::catalog::{Catalog, LATEST_TAG};
use crate::domain::{parse_intent, IntentSet, RunContext, WorkloadRef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedStep {
    ImportIfMissing {
        name: String,
        version_tag: String,
        upstream_source: String,
        tags: Vec<String>,
    },
    BuildAndPublish {
        name: String,
        build_context: PathBuf,
        tags: Vec<String>,
    },
    CheckPresence {
        workload: WorkloadRef,
        namespace: String,
    },
    ApplyManifestsIfAbsent {
        paths: Vec<PathBuf>,
        namespace: String,
    },
    Rollout {
        workload: WorkloadRef,
        image: String,
    },
}

impl fmt::Display for PlannedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannedStep::ImportIfMissing {
                name,
                version_tag,
                upstream_source,
                tags,
            } => write!(
                f,
                "import {upstream_source} as {name}:{} unless {name}:{version_tag} exists",
                tags.join(",")
            ),
            PlannedStep::BuildAndPublish {
                name,
                build_context,
                tags,
            } => write!(
                f,
                "build {} and publish {name}:{}",
                build_context.display(),
                tags.join(",")
            ),
            PlannedStep::CheckPresence {
                workload,
                namespace,
            } => write!(f, "check whether {workload} exists in {namespace}"),
            PlannedStep::ApplyManifestsIfAbsent { paths, namespace } => {
                let paths: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
                write!(f, "if absent: ensure namespace {namespace}, apply {}", paths.join(", "))
            }
            PlannedStep::Rollout { workload, image } => {
                let restart = if workload.kind.requires_explicit_restart() {
                    " (with restart)"
                } else {
                    ""
                };
                write!(f, "roll {workload} onto {image}{restart}")
            }
        }
    }
}

/// Ordered activities a run with `message` would perform.
pub fn plan_release(
    message: &str,
    catalog: &Catalog,
    ctx: &RunContext,
    manifests: &[PathBuf],
) -> (IntentSet, Vec<PlannedStep>) {
    let intent = parse_intent(message);
    let mut steps = Vec::new();

    if intent.seed_third_party {
        for spec in &catalog.seed {
            steps.push(PlannedStep::ImportIfMissing {
                name: spec.name.clone(),
                version_tag: spec.version_tag.clone(),
                upstream_source: spec.upstream_source.clone(),
                tags: spec.publish_tags(),
            });
        }
    }

    if intent.build_first_party {
        let tags = ImageBuilder::publish_tags(&ctx.run_id);
        for spec in &catalog.build {
            steps.push(PlannedStep::BuildAndPublish {
                name: spec.name.clone(),
                build_context: spec.build_context.clone(),
                tags: tags.clone(),
            });
        }
        if let Some(probe) = catalog.workload_for(&catalog.presence_probe) {
            steps.push(PlannedStep::CheckPresence {
                workload: probe.clone(),
                namespace: ctx.namespace.clone(),
            });
        }
        steps.push(PlannedStep::ApplyManifestsIfAbsent {
            paths: manifests.to_vec(),
            namespace: ctx.namespace.clone(),
        });
    }

    // Rollouts come last so a first deployment has its manifests in place.
    if intent.seed_third_party {
        for spec in &catalog.seed {
            if let Some(workload) = catalog.workload_for(&spec.name) {
                steps.push(PlannedStep::Rollout {
                    workload: workload.clone(),
                    image: ctx.image_ref(&spec.name, LATEST_TAG),
                });
            }
        }
    }

    if intent.build_first_party {
        for spec in &catalog.build {
            if let Some(workload) = catalog.workload_for(&spec.name) {
                steps.push(PlannedStep::Rollout {
                    workload: workload.clone(),
                    image: ctx.image_ref(&spec.name, ctx.run_id.as_str()),
                });
            }
        }
    }

    (intent, steps)
}
