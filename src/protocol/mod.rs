pub mod message;
pub mod codec;

pub use message::*;
pub use codec::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TERMLAB_VERSION: &str = "1.0";
pub const TERMLAB_MAGIC: &[u8] = b"TLAB\x01";

/// Identifies one live simulator / attempt: a student working on a lab.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub user_id: String,
    pub lab_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, lab_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            lab_id: lab_id.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.user_id, self.lab_id)
    }
}

#[derive(Debug, Error)]
pub enum LabError {
    #[error("Lab not found: {0}")]
    LabNotFound(String),
    #[error("No attempt for {0}; start the lab first")]
    AttemptNotFound(String),
    #[error("Lab already completed")]
    LabAlreadyCompleted,
    #[error("No more hints available")]
    HintsExhausted,
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("Session command limit reached ({0} commands)")]
    SessionLimit(u64),
    #[error("Invalid lab definition: {0}")]
    InvalidLab(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Network error: {0}")]
    Network(String),
    /// An `Error` message received from the server.
    #[error("{message}")]
    Remote { kind: String, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LabError {
    /// Stable machine-readable name used in `ErrorMessage::error_type`.
    pub fn kind(&self) -> &'static str {
        match self {
            LabError::LabNotFound(_) => "lab_not_found",
            LabError::AttemptNotFound(_) => "attempt_not_found",
            LabError::LabAlreadyCompleted => "lab_already_completed",
            LabError::HintsExhausted => "hints_exhausted",
            LabError::RateLimited(_) => "rate_limited",
            LabError::SessionLimit(_) => "session_limit",
            LabError::InvalidLab(_) => "invalid_lab",
            LabError::Config(_) => "config_error",
            LabError::Protocol(_) => "protocol_error",
            LabError::Network(_) => "network_error",
            LabError::Remote { .. } => "remote_error",
            LabError::Io(_) => "io_error",
        }
    }
}

pub type LabResult<T> = Result<T, LabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_display() {
        let key = SessionKey::new("42", "intro-linux");
        assert_eq!(key.to_string(), "42_intro-linux");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(LabError::HintsExhausted.kind(), "hints_exhausted");
        assert_eq!(LabError::LabNotFound("x".into()).to_string(), "Lab not found: x");
    }
}
