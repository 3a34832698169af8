//! Custom error types for the backup engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Backup record not found: {0}")]
    NotFound(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Backup shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Identity error: {0}")]
    Identity(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Whether the error indicates a transient condition that a later retry
    /// can reasonably be expected to clear.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Network(_) | EngineError::Http(_))
    }

    /// Whether the error is an authentication/key failure. Auth failures keep
    /// retrying on the sweep but escalate to a user warning immediately.
    pub fn is_auth(&self) -> bool {
        matches!(self, EngineError::Auth(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
