//! SMTP relay -- forward fetched messages to a fixed destination.
//!
//! Each message gets its own SMTP transaction on a fresh connection:
//! greeting, `EHLO`, optional `STARTTLS` (followed by a second `EHLO`),
//! optional `AUTH LOGIN`, then `MAIL FROM` with the Exchange sender,
//! `RCPT TO` with the configured destination, `DATA` with the raw message
//! and `QUIT`.  The message is relayed byte for byte apart from line-ending
//! normalization and dot-stuffing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::ClientConfig;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use owafetch_core::MessageSink;

use crate::error::{RelayError, Result};

/// Default SMTP port.
pub const DEFAULT_SMTP_PORT: u16 = 25;

/// Default SMTP host.
pub const DEFAULT_SMTP_HOST: &str = "localhost";

/// Connect and reply timeout in seconds.
const TIMEOUT_SECS: u64 = 30;

/// Domain announced in `EHLO`.
const EHLO_DOMAIN: &str = "owafetch.local";

// ---------------------------------------------------------------------------
// SMTP command builders (pure functions, testable)
// ---------------------------------------------------------------------------

/// Build an SMTP EHLO command.
pub fn smtp_ehlo_command(domain: &str) -> String {
    format!("EHLO {domain}\r\n")
}

/// Build an SMTP STARTTLS command.
pub fn smtp_starttls_command() -> String {
    "STARTTLS\r\n".to_string()
}

/// Build an SMTP AUTH LOGIN command.
pub fn smtp_auth_login_command() -> String {
    "AUTH LOGIN\r\n".to_string()
}

/// Encode a string to base64 for SMTP AUTH.
pub fn smtp_base64_encode(input: &str) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(input)
}

/// Build an SMTP MAIL FROM command.
pub fn smtp_mail_from_command(from: &str) -> String {
    format!("MAIL FROM:<{from}>\r\n")
}

/// Build an SMTP RCPT TO command.
pub fn smtp_rcpt_to_command(to: &str) -> String {
    format!("RCPT TO:<{to}>\r\n")
}

/// Build an SMTP DATA command.
pub fn smtp_data_command() -> String {
    "DATA\r\n".to_string()
}

/// Build an SMTP QUIT command.
pub fn smtp_quit_command() -> String {
    "QUIT\r\n".to_string()
}

/// Prepare a raw message for the DATA phase.
///
/// Bare `\n` and bare `\r` become `\r\n`, lines starting with `.` get an
/// extra `.`, and the result ends with `\r\n.\r\n`.
pub fn smtp_data_payload(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + raw.len() / 32 + 5);
    let mut at_line_start = true;
    let mut i = 0;

    while i < raw.len() {
        let byte = raw[i];
        match byte {
            b'\r' | b'\n' => {
                out.extend_from_slice(b"\r\n");
                if byte == b'\r' && raw.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                at_line_start = true;
            }
            _ => {
                if at_line_start && byte == b'.' {
                    out.push(b'.');
                }
                out.push(byte);
                at_line_start = false;
            }
        }
        i += 1;
    }

    if !at_line_start {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// One (possibly multi-line) SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    fn class(&self) -> u16 {
        self.code / 100
    }

    fn text(&self) -> String {
        self.lines.join("; ")
    }
}

/// Read an SMTP reply (one or more lines) up to its final line.
async fn read_reply<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Reply> {
    let mut lines = Vec::new();

    loop {
        let mut line = String::new();
        let n = with_timeout(reader.read_line(&mut line), "SMTP reply").await??;
        if n == 0 {
            return Err(RelayError::Protocol(
                "connection closed while waiting for reply".into(),
            ));
        }

        let trimmed = line.trim_end().to_string();
        debug!(smtp_line = %trimmed, "SMTP response line");
        // "NNN-text" continues, "NNN text" (or bare "NNN") ends the reply.
        let last = trimmed.as_bytes().get(3).is_none_or(|b| *b == b' ');
        lines.push(trimmed);
        if last {
            break;
        }
    }

    let code = lines
        .first()
        .and_then(|l| l.get(..3))
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| RelayError::Protocol(lines.join("; ")))?;

    Ok(Reply { code, lines })
}

/// Write `cmd` and require a reply of class `expected_class` (2, 3, ...).
///
/// `label` is what appears in logs and errors, so credentials never do.
async fn command<S>(
    stream: &mut BufReader<S>,
    cmd: &[u8],
    label: &str,
    expected_class: u16,
) -> Result<Reply>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(cmd).await?;
    stream.flush().await?;
    let reply = read_reply(stream).await?;
    if reply.class() != expected_class {
        return Err(RelayError::Rejected {
            command: label.to_string(),
            reply: reply.text(),
        });
    }
    Ok(reply)
}

async fn with_timeout<F: Future>(fut: F, what: &str) -> Result<F::Output> {
    tokio::time::timeout(Duration::from_secs(TIMEOUT_SECS), fut)
        .await
        .map_err(|_| RelayError::Timeout {
            seconds: TIMEOUT_SECS,
            reason: format!("{what} timed out"),
        })
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// Where and how to relay messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    /// Upgrade the connection with `STARTTLS` before authenticating.
    pub starttls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Envelope recipient for every relayed message.
    pub destination: String,
}

impl SmtpSettings {
    /// Settings for an unauthenticated relay on the default port.
    pub fn new(host: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SMTP_PORT,
            starttls: false,
            username: None,
            password: None,
            destination: destination.into(),
        }
    }
}

/// Forwards messages to [`SmtpSettings::destination`].
#[derive(Debug, Clone)]
pub struct SmtpRelay {
    settings: SmtpSettings,
}

impl SmtpRelay {
    /// Create a relay, rejecting settings without host or destination.
    pub fn new(settings: SmtpSettings) -> Result<Self> {
        if settings.host.trim().is_empty() {
            return Err(RelayError::Config("mail server host is empty".into()));
        }
        if settings.destination.trim().is_empty() {
            return Err(RelayError::Config("destination address is empty".into()));
        }
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &SmtpSettings {
        &self.settings
    }

    /// Relay one raw message on behalf of `sender`.
    pub async fn send(&self, sender: &str, raw_message: &[u8]) -> Result<()> {
        let addr = format!("{}:{}", self.settings.host, self.settings.port);
        let tcp = with_timeout(TcpStream::connect(&addr), &format!("connection to {addr}")).await??;
        let mut stream = BufReader::new(tcp);

        let greeting = read_reply(&mut stream).await?;
        if greeting.class() != 2 {
            return Err(RelayError::Rejected {
                command: "connect".into(),
                reply: greeting.text(),
            });
        }

        let ehlo = smtp_ehlo_command(EHLO_DOMAIN);
        command(&mut stream, ehlo.as_bytes(), "EHLO", 2).await?;

        if self.settings.starttls {
            command(&mut stream, smtp_starttls_command().as_bytes(), "STARTTLS", 2).await?;
            let tls = self.upgrade(stream.into_inner()).await?;
            let mut stream = BufReader::new(tls);
            command(&mut stream, ehlo.as_bytes(), "EHLO", 2).await?;
            self.transact(&mut stream, sender, raw_message).await
        } else {
            self.transact(&mut stream, sender, raw_message).await
        }
    }

    /// Authenticate if configured, then run MAIL/RCPT/DATA/QUIT.
    async fn transact<S>(
        &self,
        stream: &mut BufReader<S>,
        sender: &str,
        raw_message: &[u8],
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if let (Some(user), Some(pass)) = (&self.settings.username, &self.settings.password) {
            command(stream, smtp_auth_login_command().as_bytes(), "AUTH LOGIN", 3).await?;
            let b64_user = format!("{}\r\n", smtp_base64_encode(user));
            command(stream, b64_user.as_bytes(), "AUTH username", 3).await?;
            let b64_pass = format!("{}\r\n", smtp_base64_encode(pass));
            command(stream, b64_pass.as_bytes(), "AUTH password", 2).await?;
        }

        let mail_from = smtp_mail_from_command(sender);
        command(stream, mail_from.as_bytes(), "MAIL FROM", 2).await?;

        let rcpt_to = smtp_rcpt_to_command(&self.settings.destination);
        command(stream, rcpt_to.as_bytes(), "RCPT TO", 2).await?;

        command(stream, smtp_data_command().as_bytes(), "DATA", 3).await?;
        command(stream, &smtp_data_payload(raw_message), "message data", 2).await?;

        // The message is accepted at this point; a failed QUIT changes nothing.
        let _ = stream.write_all(smtp_quit_command().as_bytes()).await;
        let _ = stream.flush().await;

        info!(
            sender = sender,
            destination = %self.settings.destination,
            bytes = raw_message.len(),
            "message relayed"
        );
        Ok(())
    }

    /// Wrap the plain connection in TLS after a successful `STARTTLS`.
    async fn upgrade(&self, tcp: TcpStream) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
        let connector = TlsConnector::from(tls_client_config()?);
        let server_name = rustls::pki_types::ServerName::try_from(self.settings.host.clone())
            .map_err(|e| RelayError::Tls(format!("invalid server name '{}': {e}", self.settings.host)))?;

        with_timeout(connector.connect(server_name, tcp), "TLS handshake")
            .await?
            .map_err(|e| RelayError::Tls(format!("TLS handshake with {} failed: {e}", self.settings.host)))
    }
}

#[async_trait]
impl MessageSink for SmtpRelay {
    async fn forward(&self, sender: &str, raw_message: &[u8]) -> owafetch_core::Result<()> {
        self.send(sender, raw_message).await.map_err(Into::into)
    }
}

/// Build a rustls `ClientConfig` using Mozilla's bundled root certificates.
fn tls_client_config() -> Result<Arc<ClientConfig>> {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| RelayError::Tls(format!("unsupported TLS configuration: {e}")))?
    .with_root_certificates(root_store)
    .with_no_client_auth();
    Ok(Arc::new(config))
}
