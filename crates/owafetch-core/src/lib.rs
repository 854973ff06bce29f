//! Exchange Outlook Web Access client.
//!
//! This crate speaks the WebDAV dialect of Exchange OWA:
//!
//! - **[`session`]** -- form-based login, path discovery, message listing,
//!   fetching and batch mutation, all through one authenticated request
//!   primitive.
//! - **[`transport`]** -- the one-exchange-at-a-time HTTP seam and its
//!   `reqwest` implementation.
//! - **[`request_body`]** -- the XML payloads the protocol sends.
//! - **[`response`]** -- extraction of paths and message summaries from
//!   server responses.
//! - **[`normalize`]** -- escaping of server hrefs before they are reused.
//! - **[`fetch`]** -- the run loop that ties the above together and hands
//!   each message to a [`MessageSink`].
//! - **[`error`]** -- the crate error type via [`thiserror`].

pub mod error;
pub mod fetch;
pub mod normalize;
pub mod request_body;
pub mod response;
pub mod session;
pub mod transport;

pub use error::{OwaError, Result};
pub use fetch::{Credentials, FetchOptions, FetchReport, MessageSink, run};
pub use normalize::normalize_resource_name;
pub use response::{MessageListing, MessageSummary, ResponseParser};
pub use session::{DEFAULT_FORM_LOGIN_PATH, Session};
pub use transport::{DavMethod, HttpTransport, RawResponse, RequestEnvelope, SecurityMode, Transport};
