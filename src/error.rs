//! Error types for the topology deployment engine

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// A single delete that failed during teardown
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TeardownFailure {
    /// Resource kind (StatefulSet, Service, ...)
    pub kind: String,
    /// Resource name
    pub name: String,
    /// Error message returned by the API server
    pub message: String,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.name, self.message)
    }
}

/// Main error type for topology operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The topology graph cannot be deployed as authored
    #[error("validation error: {0}")]
    Validation(String),

    /// No topology with the given id exists in the store
    #[error("topology not found: {0}")]
    TopologyNotFound(String),

    /// Persistence collaborator failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Another operation owns the topology's deploy status
    #[error("conflict: {0}")]
    Conflict(String),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Create call rejected because the object exists (HTTP 409)
    #[error("{kind} {name} already exists")]
    AlreadyExists {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
    },

    /// Object does not exist (HTTP 404)
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
    },

    /// A cluster API call exceeded its deadline
    #[error("{operation} timed out after {}s", .timeout.as_secs())]
    Timeout {
        /// Operation that was cut off
        operation: String,
        /// Deadline that was exceeded
        timeout: Duration,
    },

    /// One or more deletes failed during teardown
    #[error("teardown failed for {} resource(s): {}", .failures.len(), join_failures(.failures))]
    Teardown {
        /// Every delete that failed
        failures: Vec<TeardownFailure>,
    },

    /// A deploy failed and its outcome could not be written back, so the
    /// stored status still says `deploying`. Undeploy clears it.
    #[error("deploy of topology {topology} failed ({cause}) and recording the outcome failed ({store}); status remains deploying until undeployed")]
    StaleStatus {
        /// Topology whose status is stale
        topology: String,
        /// Why the deploy failed
        cause: Box<Error>,
        /// Why the status write failed
        store: Box<Error>,
    },

    /// Identity generation failed (entropy source unavailable)
    #[error("identity error: {0}")]
    Identity(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid engine configuration
    #[error("configuration error: {0}")]
    Config(String),
}

fn join_failures(failures: &[TeardownFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a storage error with the given message
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a conflict error with the given message
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create an identity error with the given message
    pub fn identity(msg: impl Into<String>) -> Self {
        Self::Identity(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a stale-status error from the deploy failure and the failed write
    pub fn stale_status(topology: impl Into<String>, cause: Error, store: Error) -> Self {
        Self::StaleStatus {
            topology: topology.into(),
            cause: Box::new(cause),
            store: Box::new(store),
        }
    }

    /// Create an already-exists error for a resource
    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a not-found error for a resource
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// True for errors caused by the request itself; these are never retried
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::TopologyNotFound(_) | Self::Conflict(_)
        )
    }

    /// True for errors the caller may resolve by retrying the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_)
                | Self::Kube(_)
                | Self::Timeout { .. }
                | Self::Teardown { .. }
                | Self::StaleStatus { .. }
        )
    }
}
