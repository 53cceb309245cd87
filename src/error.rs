//! Error types for the Exam Proctoring Agent
//!
//! The taxonomy distinguishes transient sensor faults (logged, sampling
//! continues), recoverable signaling errors (surfaced, caller may retry),
//! and contract violations (programming errors that surface hard).

use thiserror::Error;

use crate::contracts::CallState;

/// Main error type for proctoring operations
#[derive(Error, Debug)]
pub enum ProctorError {
    /// A detector oracle failed for one tick; the tick is skipped and
    /// sampling continues on the next one.
    #[error("Sensor failure: {0}")]
    SensorFailure(String),

    /// Local media acquisition failed; the call stays in its current state
    /// and the caller may retry.
    #[error("Media unavailable: {0}")]
    MediaUnavailable(String),

    /// The signaling relay rejected or dropped a message. Never forces
    /// termination by itself.
    #[error("Signaling relay failure: {0}")]
    RelayFailure(String),

    /// A call operation was requested from a state that does not allow it.
    #[error("Invalid call transition: {operation} from {state}")]
    InvalidTransition {
        operation: &'static str,
        state: CallState,
    },

    /// The session has already reached its terminal state.
    #[error("Session already terminated")]
    SessionEnded,

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An input file was missing or unreadable.
    #[error("File error: {0}")]
    FileError(String),

    /// Misuse of the agent's public API (missing dependency, double start).
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// Internal channel or task failure.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ProctorError {
    /// Create a sensor failure error
    pub fn sensor(msg: impl Into<String>) -> Self {
        ProctorError::SensorFailure(msg.into())
    }

    /// Create a media acquisition error
    pub fn media(msg: impl Into<String>) -> Self {
        ProctorError::MediaUnavailable(msg.into())
    }

    /// Create a relay failure error
    pub fn relay(msg: impl Into<String>) -> Self {
        ProctorError::RelayFailure(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        ProctorError::ConfigError(msg.into())
    }

    /// Create a file access error
    pub fn file(msg: impl Into<String>) -> Self {
        ProctorError::FileError(msg.into())
    }

    /// Create a contract violation error
    pub fn contract(msg: impl Into<String>) -> Self {
        ProctorError::ContractViolation(msg.into())
    }

    /// Whether the condition is expected and retryable (vs a programming
    /// error or a terminal state).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProctorError::SensorFailure(_)
                | ProctorError::MediaUnavailable(_)
                | ProctorError::RelayFailure(_)
                | ProctorError::InvalidTransition { .. }
        )
    }
}

impl From<serde_json::Error> for ProctorError {
    fn from(err: serde_json::Error) -> Self {
        ProctorError::InternalError(format!("JSON error: {}", err))
    }
}

/// Result type alias for proctoring operations
pub type Result<T> = std::result::Result<T, ProctorError>;
