//! Response parsing for the fixed set of OWA response shapes.
//!
//! Exchange answers with a handful of well-known documents: the HTML
//! landing page of a mailbox, a `PROPFIND` multistatus carrying the inbox
//! URL, and a `SEARCH` multistatus listing messages.  Full XML parsing is
//! not needed to pull the few fields the client uses; each extractor is a
//! regex whose captures stop at the next closing tag (non-greedy), so
//! nested or escaped content inside a field is kept verbatim.

use regex::Regex;
use tracing::warn;

use crate::error::{OwaError, Result};

const BASE_HREF_PATTERN: &str = r#"<BASE href="([^"]+)">"#;
const INBOX_PATTERN: &str = r"<d:inbox>([^<]+)</d:inbox>";
const RESPONSE_BLOCK_PATTERN: &str = r"(?s)<a:response>(.+?)</a:response>";
const MESSAGE_FIELDS_PATTERN: &str = r"(?s)<a:href>(?P<href>.+?)</a:href>.*?<d:fromemail>(?P<fromemail>.+?)</d:fromemail>.*?<d:subject>(?P<subject>.*?)</d:subject>";

/// One message found by a mailbox listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSummary {
    /// Server href of the message, as returned (not yet normalized).
    pub href: String,
    /// Sender email address.
    pub sender: String,
    /// Subject line; may be empty.
    pub subject: String,
}

/// The outcome of parsing a `SEARCH` multistatus body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageListing {
    /// Well-formed entries, in document order.
    pub messages: Vec<MessageSummary>,
    /// Number of `<a:response>` blocks that did not carry the expected
    /// href/sender/subject fields.
    pub skipped: usize,
}

/// Compiled extractors for the OWA response shapes.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    base_href: Regex,
    inbox: Regex,
    response_block: Regex,
    message_fields: Regex,
}

impl ResponseParser {
    /// Compile every extractor.
    ///
    /// # Errors
    ///
    /// Returns [`OwaError::InvalidPattern`] if a pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            base_href: compile(BASE_HREF_PATTERN)?,
            inbox: compile(INBOX_PATTERN)?,
            response_block: compile(RESPONSE_BLOCK_PATTERN)?,
            message_fields: compile(MESSAGE_FIELDS_PATTERN)?,
        })
    }

    /// Extract the root path from a mailbox landing page.
    ///
    /// The path is the `href` of the page's `<BASE href="...">` tag.  A page
    /// without that tag comes from a server version this client does not
    /// understand.
    pub fn root_path(&self, html: &str) -> Result<String> {
        self.base_href
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or(OwaError::MissingElement {
                element: "<BASE href=\"...\">",
                context: "root path",
            })
    }

    /// Extract the inbox path from the first `<d:inbox>` element.
    pub fn inbox_path(&self, xml: &str) -> Result<String> {
        self.inbox
            .captures(xml)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or(OwaError::MissingElement {
                element: "<d:inbox>",
                context: "inbox lookup",
            })
    }

    /// Parse every message entry of a `SEARCH` response.
    ///
    /// Entries missing any of the three fields are skipped with a warning;
    /// one bad entry never discards the rest of the listing.
    pub fn message_list(&self, xml: &str) -> MessageListing {
        let mut listing = MessageListing::default();

        for block in self.response_block.captures_iter(xml) {
            let Some(item) = block.get(1).map(|m| m.as_str()) else {
                continue;
            };

            match self.message_fields.captures(item) {
                Some(fields) => listing.messages.push(MessageSummary {
                    href: fields["href"].to_string(),
                    sender: fields["fromemail"].to_string(),
                    subject: fields["subject"].to_string(),
                }),
                None => {
                    warn!(entry = %item, "skipping malformed message entry");
                    listing.skipped += 1;
                }
            }
        }

        listing
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| OwaError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
