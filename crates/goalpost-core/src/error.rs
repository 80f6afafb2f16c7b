//! Error types for Goalpost.

use thiserror::Error;

use crate::types::GoalKey;

/// Main error type for goal lifecycle operations.
#[derive(Error, Debug, Clone)]
pub enum GoalError {
    /// A mutation was attempted against an outdated goal version.
    #[error("Stale version for goal {key}: expected {expected}, stored {actual}")]
    StaleVersion {
        key: GoalKey,
        expected: u64,
        actual: u64,
    },

    /// The requested state is not reachable from the current state.
    #[error("Invalid transition for goal {key} from {from} to {to}: {reason}")]
    InvalidTransition {
        key: GoalKey,
        from: String,
        to: String,
        reason: String,
    },

    /// A goal matched a cancellation query but is owned by another registration.
    #[error("Goal {key} is owned by {owner}, not cancellable by {registration}")]
    UnownedCancellation {
        key: GoalKey,
        owner: String,
        registration: String,
    },

    /// A completion listener failed.
    #[error("Listener {listener} failed: {message}")]
    Listener { listener: String, message: String },

    /// The goal executor reported an error.
    #[error("Executor failed for goal {key}: {message}")]
    Executor { key: GoalKey, message: String },

    /// Goal validation failed.
    #[error("Goal validation failed: {message}")]
    GoalInvalid { message: String },

    /// Configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Goal store error.
    #[error("Goal store error: {message}")]
    StateError { message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Resource not found.
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GoalError {
    /// Returns true if the caller may reload and retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GoalError::StaleVersion { .. } | GoalError::StateError { .. })
    }

    /// Returns the goal key if available.
    pub fn goal_key(&self) -> Option<&GoalKey> {
        match self {
            GoalError::StaleVersion { key, .. }
            | GoalError::InvalidTransition { key, .. }
            | GoalError::UnownedCancellation { key, .. }
            | GoalError::Executor { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Shorthand for a missing goal.
    pub fn goal_not_found(key: &GoalKey) -> Self {
        GoalError::NotFound {
            resource_type: "goal".to_string(),
            id: key.to_string(),
        }
    }
}

/// Convenience Result type for goal operations.
pub type Result<T> = std::result::Result<T, GoalError>;

impl From<serde_json::Error> for GoalError {
    fn from(err: serde_json::Error) -> Self {
        GoalError::SerializationError(err.to_string())
    }
}
