//! Core error types.
//!
//! Every fallible operation in this crate surfaces an [`OwaError`].  The
//! variants mirror the failure classes of an OWA session: the transport
//! itself, the HTTP status of a protocol call, or the shape of a response
//! body.  Whether a given error is fatal for a run is decided by the caller
//! (see [`crate::fetch::run`]), never by this crate.

/// Unified error type for the OWA/WebDAV client.
#[derive(Debug, thiserror::Error)]
pub enum OwaError {
    /// The HTTP exchange could not be completed (connection refused, TLS
    /// failure, truncated response).
    #[error("transport error on {method} {target}: {reason}")]
    Transport {
        method: String,
        target: String,
        reason: String,
    },

    /// The server answered 401 on the root-path lookup: the form login did
    /// not produce a usable session.
    #[error("access denied for `{path}`: authentication failed")]
    AccessDenied { path: String },

    /// The server answered 404 on the root-path lookup: the configured
    /// mailbox path does not exist.
    #[error("exchange mailbox path `{path}` not found")]
    MailboxNotFound { path: String },

    /// A protocol call returned a status the client cannot reason about.
    #[error("unexpected status {status} for {method} {path}")]
    UnexpectedStatus {
        method: String,
        path: String,
        status: u16,
    },

    /// An element the protocol relies on is absent from a response body.
    #[error("could not find {element} in {context} response")]
    MissingElement {
        element: &'static str,
        context: &'static str,
    },

    /// A response extractor pattern failed to compile.
    #[error("invalid regex pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A request could not be put on the wire (bad header, bad URL).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The message sink failed to forward a message.
    #[error("forwarding failed: {0}")]
    Forward(String),
}

/// Convenience alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, OwaError>;
