//! owafetch -- fetch mail from Exchange Outlook Web Access and relay it to
//! an SMTP server.
//!
//! Usage:
//!   owafetch fetch.properties           # forward unread mail
//!   owafetch -a fetch.properties        # forward all mail
//!   owafetch -l fetch.properties        # list the inbox only
//!   owafetch -p fetch.properties        # show the loaded settings

mod cli;
mod config;
mod logging;
mod sink;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use clap::Parser;

use owafetch_core::{FetchOptions, MessageSink, Session};
use owafetch_relay::SmtpRelay;

use crate::cli::Cli;
use crate::config::{FetchConfig, load_properties};
use crate::logging::init_tracing;
use crate::sink::ListOnlySink;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level());

    let props = load_properties(&cli.properties_file)?;

    if cli.print {
        println!("Properties from {}:", cli.properties_file.display());
        for line in props.display_lines() {
            println!("  {line}");
        }
        return Ok(());
    }

    let config = FetchConfig::from_properties(&props)?;
    let options = FetchOptions {
        include_read: cli.all || config.fetch_all,
        list_only: cli.list,
        delete_after_forward: config.delete_after_forward,
    };

    let relay = match (&config.smtp, options.list_only) {
        (Some(settings), _) => Some(
            SmtpRelay::new(settings.clone()).context("invalid mail server settings")?,
        ),
        (None, true) => None,
        (None, false) => bail!("DestinationAddress must be set unless listing with --list"),
    };
    let sink: &dyn MessageSink = match &relay {
        Some(relay) => relay,
        None => &ListOnlySink,
    };

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current message");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    tracing::info!(
        server = %config.server,
        security = %config.security,
        user = %config.credentials.username,
        "connecting"
    );

    let mut session = Session::connect(&config.server, config.security)
        .context("failed to set up the HTTP client")?;
    let report = owafetch_core::run(&mut session, &config.credentials, options, sink, &cancel)
        .await
        .with_context(|| format!("fetch from {} failed", config.server))?;

    tracing::info!(
        listed = report.listed,
        forwarded = report.forwarded,
        marked_read = report.marked_read,
        deleted = report.deleted,
        failed = report.failed,
        cancelled = report.cancelled,
        "fetch finished"
    );

    Ok(())
}
