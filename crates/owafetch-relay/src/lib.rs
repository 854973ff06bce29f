//! Message forwarding for owafetch.
//!
//! Messages fetched from Exchange are relayed over SMTP by [`SmtpRelay`],
//! which plugs into the core pipeline as its [`owafetch_core::MessageSink`].

pub mod error;
pub mod smtp;

pub use error::{RelayError, Result};
pub use smtp::{DEFAULT_SMTP_HOST, DEFAULT_SMTP_PORT, SmtpRelay, SmtpSettings};
