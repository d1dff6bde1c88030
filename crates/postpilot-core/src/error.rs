//! Error taxonomy for the task engine.
//!
//! Validation / NotFound / InvalidState are synchronous failures returned
//! to the direct caller of a public API. Adapter and Store errors drive
//! the retry state machine during autonomous polling and are absorbed into
//! task state rather than propagated.

use thiserror::Error;

/// All errors the engine can produce.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller supplied invalid input (e.g. a scheduling time in the past).
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced task/campaign/message id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation attempted against a record whose status forbids it.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An execution adapter failed while performing a platform action.
    #[error("adapter error: {0}")]
    Adapter(String),

    /// The task/campaign store failed.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration load/parse failure.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for a validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Shorthand for a missing record.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Shorthand for a status-forbidden operation.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}

/// Convenience result type used across all PostPilot crates.
pub type Result<T> = std::result::Result<T, EngineError>;
