//! Domain models for shipit.
//!
//! Canonical definitions for the core entities:
//! - `IntentSet`: Release activities requested by a trigger message
//! - `Catalog`: Static image and workload tables
//! - `RunContext`: Run identifier, namespace and registry of one invocation

pub mod catalog;
pub mod error;
pub mod intent;
pub mod run_context;

pub use catalog::{BuildSpec, Catalog, ImportSpec, WorkloadKind, WorkloadRef, LATEST_TAG};
pub use error::{CollaboratorError, CollaboratorResult, Result, ShipitError};
pub use intent::{parse_intent, IntentSet, APP_TAG, SEED_TAG};
pub use run_context::{RunContext, RunIdentifier};
