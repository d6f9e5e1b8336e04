//! WolfVote Error Types

use thiserror::Error;

/// Result type alias for WolfVote operations
pub type Result<T> = std::result::Result<T, Error>;

/// WolfVote error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Membership errors
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    // Election errors
    #[error("Election error: {0}")]
    Election(String),

    // Protocol errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Message serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Unexpected response from {address}: {message_type}")]
    UnexpectedResponse {
        address: String,
        message_type: &'static str,
    },

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionTimeout(_)
                | Error::ConnectionFailed { .. }
                | Error::Network(_)
        )
    }
}
