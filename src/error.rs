//! # Operator Errors
//!
//! Error taxonomy for the reconciliation engine.
//!
//! Errors are either terminal (a misconfiguration that retrying cannot fix) or
//! transient (everything else). Terminal errors are written to the `Ready`
//! condition and never retried automatically; transient errors go back to the
//! work queue and are retried with backoff.

use crate::controller::client::ClientError;
use thiserror::Error;

/// Errors raised by actions, primitives and the reconcile driver.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// Kubernetes API boundary error.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Non-recoverable error; suppresses automatic retry.
    #[error("{0}")]
    Terminal(String),

    /// Invalid resource configuration (terminal).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Object serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The object disappeared while it was being reconciled.
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    /// Optimistic-concurrency retries ran out.
    #[error("Gave up after {attempts} conflicting writes to {name}")]
    ConflictRetriesExhausted { name: String, attempts: u32 },

    /// Another controller already owns the object.
    #[error("Object {name} is already owned by another controller: {owner}")]
    AlreadyOwned { name: String, owner: String },

    /// The monitoring CRD is not installed (gate closed).
    #[error("ServiceMonitor API is not available")]
    MonitoringUnavailable,
}

/// Result type for operator operations.
pub type OperatorResult<T> = Result<T, OperatorError>;

impl OperatorError {
    /// Build a terminal error from any message.
    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal(message.into())
    }

    /// Whether this error should suppress backoff-retry.
    ///
    /// An object owned by another controller counts as a misconfiguration.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperatorError::Terminal(_)
                | OperatorError::InvalidConfig(_)
                | OperatorError::AlreadyOwned { .. }
        )
    }

    /// Whether the error is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, OperatorError::Client(ClientError::Conflict(_)))
    }

    /// Whether the error reports a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OperatorError::NotFound { .. } | OperatorError::Client(ClientError::NotFound(_))
        )
    }
}
