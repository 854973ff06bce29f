//! Relay error types.

use owafetch_core::OwaError;

/// Unified error type for the SMTP relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// An I/O operation on the SMTP connection failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Connecting or waiting for a reply took too long.
    #[error("timeout after {seconds}s: {reason}")]
    Timeout { seconds: u64, reason: String },

    /// The server answered a command with a reply outside the expected
    /// class.
    #[error("smtp server rejected `{command}`: {reply}")]
    Rejected { command: String, reply: String },

    /// The server closed the connection or sent an unparseable reply.
    #[error("malformed smtp reply: {0}")]
    Protocol(String),

    /// STARTTLS negotiation failed.
    #[error("tls error: {0}")]
    Tls(String),

    /// The relay settings are unusable.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<RelayError> for OwaError {
    fn from(e: RelayError) -> Self {
        OwaError::Forward(e.to_string())
    }
}

/// Convenience alias used throughout the relay crate.
pub type Result<T> = std::result::Result<T, RelayError>;
