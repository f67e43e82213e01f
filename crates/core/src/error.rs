//! Error types for the upload domain.

use thiserror::Error;

/// Core domain error type.
///
/// Only caller contract violations surface here. Data-level failures inside
/// the state machines (unknown mechanism, blocked publish, refused extension)
/// are recorded as `error` transitions with notices instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid transition: {machine} cannot {operation} while {state}")]
    InvalidTransition {
        machine: &'static str,
        state: &'static str,
        operation: &'static str,
    },

    #[error("invalid session ID: {0}")]
    InvalidSessionId(String),

    #[error("invalid session token: {0}")]
    InvalidToken(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error is an invalid-transition rejection.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
