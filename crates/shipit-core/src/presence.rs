//! First-deployment detection.

use serde::{Deserialize, Serialize};

use crate::collaborators::Cluster;
use crate::domain::catalog::WorkloadRef;
use crate::domain::error::{Result, ShipitError};

/// Answer of a presence check, as recorded in the release summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresenceRecord {
    pub workload: WorkloadRef,
    pub namespace: String,
    pub present: bool,
}

/// Whether `workload` already runs in `namespace`.
///
/// Absence is `Ok(false)`. A query that cannot be answered (credentials,
/// connectivity) is an error and must never be read as absence.
pub async fn workload_present(
    cluster: &dyn Cluster,
    workload: &WorkloadRef,
    namespace: &str,
) -> Result<PresenceRecord> {
    let present = cluster
        .workload_exists(workload, namespace)
        .await
        .map_err(|source| ShipitError::PresenceCheck {
            workload: workload.to_string(),
            namespace: namespace.to_string(),
            source,
        })?;

    Ok(PresenceRecord {
        workload: workload.clone(),
        namespace: namespace.to_string(),
        present,
    })
}
