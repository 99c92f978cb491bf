//! Error taxonomy for shipit.

use std::time::Duration;

/// Errors reported by an external collaborator (registry, builder, cluster).
///
/// These are always scoped to a single catalog entry or workload; whether
/// they fail the run is decided by the orchestrator, not by the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("failed to launch `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    #[error("`{command}` exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("`{command}` timed out after {}s", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("unexpected output from `{command}`: {reason}")]
    InvalidOutput { command: String, reason: String },

    #[error("{0}")]
    Rejected(String),
}

/// Result type for collaborator calls.
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

/// Orchestrator-level errors.
#[derive(Debug, thiserror::Error)]
pub enum ShipitError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("invalid run identifier '{value}': {reason}")]
    InvalidRunId { value: String, reason: String },

    #[error("presence check for {workload} in namespace '{namespace}' failed: {source}")]
    PresenceCheck {
        workload: String,
        namespace: String,
        #[source]
        source: CollaboratorError,
    },

    #[error("git error: {0}")]
    GitError(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for shipit domain operations.
pub type Result<T> = std::result::Result<T, ShipitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_error_display() {
        let err = CollaboratorError::CommandFailed {
            command: "kubectl get deployment order-service".to_string(),
            exit_code: 1,
            stderr: "Unauthorized".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exited with code 1"));
        assert!(msg.contains("Unauthorized"));

        let err = CollaboratorError::Timeout {
            command: "az acr build".to_string(),
            timeout: Duration::from_secs(90),
        };
        assert!(err.to_string().contains("90s"));
    }

    #[test]
    fn test_presence_error_keeps_source() {
        let err = ShipitError::PresenceCheck {
            workload: "deployment/order-service".to_string(),
            namespace: "pets".to_string(),
            source: CollaboratorError::Rejected("connection refused".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("deployment/order-service"));
        assert!(msg.contains("connection refused"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_invalid_run_id_error() {
        let err = ShipitError::InvalidRunId {
            value: "latest".to_string(),
            reason: "collides with the floating tag".to_string(),
        };
        assert!(err.to_string().contains("invalid run identifier 'latest'"));
    }
}
