//! Error types for FORMA
//!
//! Only configuration-time and orchestration failures are errors.
//! Per-frame faults (low confidence, missing joints, numeric trouble) are
//! reported as data by the analysis layer and never surface here.

use thiserror::Error;

use crate::SessionId;

/// Core FORMA errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormaError {
    // Configuration errors
    #[error("Unknown mode: {0:?}")]
    UnknownMode(String),

    #[error("Invalid threshold profile: {0}")]
    InvalidProfile(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Session errors
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Session limit reached: {0} active sessions")]
    SessionLimitReached(usize),

    #[error("Session closed: {0}")]
    SessionClosed(SessionId),

    // Detector errors
    #[error("Detector error: {0}")]
    Detector(String),
}

/// Result type for FORMA operations
pub type FormaResult<T> = Result<T, FormaError>;
