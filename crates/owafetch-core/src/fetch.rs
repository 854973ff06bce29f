//! The fetch pipeline: authenticate, discover paths, list, then fetch,
//! forward and mark (or delete) each message in turn.
//!
//! Discovery failures and transport failures end the run with the typed
//! error.  Other failures while processing one message are logged, counted
//! in the [`FetchReport`] and the loop moves on.  A message is only marked read or deleted after it
//! was forwarded, so a failure anywhere before that leaves it on the
//! server to be picked up by the next run.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::error::{OwaError, Result};
use crate::response::MessageSummary;
use crate::session::{DEFAULT_FORM_LOGIN_PATH, Session};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// What the pipeline needs to log in and find the mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name including the domain qualifier (`DOMAIN\user`).
    pub username: String,
    pub password: String,
    /// Mailbox path below the server root, without surrounding slashes.
    pub exchange_path: String,
    /// Server path of the form-login endpoint.
    pub form_login_path: String,
}

impl Credentials {
    /// Credentials using the default form-login endpoint.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        exchange_path: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            exchange_path: exchange_path.into(),
            form_login_path: DEFAULT_FORM_LOGIN_PATH.to_string(),
        }
    }
}

/// Knobs controlling what the pipeline does with listed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchOptions {
    /// List read messages too, not only unread ones.
    pub include_read: bool,
    /// Only log the listing; do not fetch, forward or mutate anything.
    pub list_only: bool,
    /// Delete forwarded messages instead of marking them read.
    pub delete_after_forward: bool,
}

/// Counters describing a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchReport {
    pub listed: usize,
    pub forwarded: usize,
    pub marked_read: usize,
    pub deleted: usize,
    /// Messages whose fetch, forward or mutation failed.
    pub failed: usize,
    /// Whether the loop stopped early because cancellation was requested.
    pub cancelled: bool,
}

/// Destination for fetched messages.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Relay the raw message on behalf of `sender`.
    async fn forward(&self, sender: &str, raw_message: &[u8]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

/// Run one complete fetch against `session`.
///
/// `cancel` is checked between messages; setting it stops the loop after
/// the message currently being processed.
pub async fn run(
    session: &mut Session,
    credentials: &Credentials,
    options: FetchOptions,
    sink: &dyn MessageSink,
    cancel: &AtomicBool,
) -> Result<FetchReport> {
    session
        .authenticate(
            &credentials.username,
            &credentials.password,
            &credentials.exchange_path,
            &credentials.form_login_path,
        )
        .await?;

    let root_path = session.get_root_path(&credentials.exchange_path).await?;
    let inbox_path = session.get_inbox_path(&root_path).await?;
    let messages = session
        .list_messages(&inbox_path, options.include_read)
        .await?;

    let mut report = FetchReport {
        listed: messages.len(),
        ..FetchReport::default()
    };
    info!(
        count = messages.len(),
        unread_only = !options.include_read,
        "found messages"
    );

    for (index, message) in messages.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            warn!(remaining = messages.len() - index, "cancelled, stopping before next message");
            report.cancelled = true;
            break;
        }

        if options.list_only {
            info!(
                index = index,
                sender = %message.sender,
                subject = %message.subject,
                "listed message"
            );
            continue;
        }

        process_message(session, &inbox_path, index, message, options, sink, &mut report).await?;
    }

    Ok(report)
}

/// Fetch, forward and mark or delete one message, recording the outcome.
///
/// Only a broken transport is returned as an error; every other failure is
/// counted against this message.
async fn process_message(
    session: &mut Session,
    inbox_path: &str,
    index: usize,
    message: &MessageSummary,
    options: FetchOptions,
    sink: &dyn MessageSink,
    report: &mut FetchReport,
) -> Result<()> {
    info!(
        index = index,
        sender = %message.sender,
        subject = %message.subject,
        "sending message"
    );

    let raw = match session.get_message(&message.href).await {
        Ok(raw) => raw,
        Err(e @ OwaError::Transport { .. }) => return Err(e),
        Err(e) => {
            error!(index = index, href = %message.href, error = %e, "failed to fetch message");
            report.failed += 1;
            return Ok(());
        }
    };

    if let Err(e) = sink.forward(&message.sender, &raw).await {
        error!(index = index, error = %e, "failed to forward message");
        report.failed += 1;
        return Ok(());
    }
    report.forwarded += 1;

    let (outcome, action) = if options.delete_after_forward {
        (session.delete_message(inbox_path, &message.href).await, "delete")
    } else {
        (session.mark_as_read(inbox_path, &message.href).await, "mark read")
    };

    match outcome {
        Ok(true) if options.delete_after_forward => {
            info!(index = index, "deleted message");
            report.deleted += 1;
        }
        Ok(true) => {
            info!(index = index, "marked message read");
            report.marked_read += 1;
        }
        Ok(false) => {
            warn!(index = index, action = action, "server refused the change");
            report.failed += 1;
        }
        Err(e @ OwaError::Transport { .. }) => return Err(e),
        Err(e) => {
            error!(index = index, action = action, error = %e, "failed to change message");
            report.failed += 1;
        }
    }

    Ok(())
}
