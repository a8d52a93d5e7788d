//! Domain errors for the factotum orchestrator.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the orchestration engine.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Task {0} is not waiting for a response")]
    NotWaiting(Uuid),

    #[error("Task {0} is not in a failed state")]
    NotFailed(Uuid),

    #[error("Task {id} has exhausted its {max_retries} retries")]
    RetryExhausted { id: Uuid, max_retries: u32 },

    #[error("Tool '{tool}' execution failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Reasoning failed: {0}")]
    Reasoning(String),

    #[error("Concurrency conflict: task {0} was modified")]
    ConcurrencyConflict(Uuid),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
