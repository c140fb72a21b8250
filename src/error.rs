//! Error types for chatsweep

use thiserror::Error;

/// Result type alias using chatsweep's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for chatsweep
#[derive(Error, Debug)]
pub enum Error {
    /// Gateway rejected the session handshake
    #[error("Authentication failed ({status}): {body}")]
    AuthenticationFailed { status: u16, body: String },

    /// An authenticated operation was attempted before login
    #[error("Session not established: login must succeed first")]
    SessionNotEstablished,

    /// An authenticated gateway call returned a non-2xx status
    #[error("Gateway request '{operation}' failed ({status}): {body}")]
    GatewayRequestFailed {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The long poll stayed non-200 past the retry bound
    #[error("Could not ack sequence {ack}: poll retries exhausted")]
    PollExhausted { ack: i64 },

    /// An expected protocol message was absent from a poll result
    #[error("Protocol invariant violated: {0}")]
    ProtocolInvariantViolation(String),

    /// A backend record operation failed
    #[error("Backend operation failed: {0}")]
    BackendOperationFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if the error originated in the chat gateway protocol,
    /// as opposed to the backend record store or local configuration.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationFailed { .. }
                | Error::SessionNotEstablished
                | Error::GatewayRequestFailed { .. }
                | Error::PollExhausted { .. }
                | Error::ProtocolInvariantViolation(_)
        )
    }
}
