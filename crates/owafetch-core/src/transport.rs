//! HTTP transport seam.
//!
//! A [`Session`](crate::session::Session) never talks to the network
//! directly.  It hands a [`RequestEnvelope`] to a [`Transport`] and gets a
//! fully drained [`RawResponse`] back.  [`HttpTransport`] is the production
//! implementation on top of `reqwest`; tests plug in scripted transports.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{OwaError, Result};

/// User agent sent to the server.  OWA serves its WebDAV interface to
/// browsers it recognizes.
pub const USER_AGENT: &str = "Mozilla/4.0 (compatible; MSIE 6.0; Windows NT 5.2; .NET CLR 1.1.4322)";

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Whether the session runs over plain HTTP or HTTPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecurityMode {
    /// `http://`
    #[default]
    Plain,
    /// `https://`
    Secure,
}

impl SecurityMode {
    /// Build a mode from the configuration's boolean "secure" flag.
    pub fn from_flag(secure: bool) -> Self {
        if secure { Self::Secure } else { Self::Plain }
    }

    /// The URL scheme for this mode.
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Plain => "http",
            Self::Secure => "https",
        }
    }
}

impl std::fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Secure => write!(f, "secure"),
        }
    }
}

/// The HTTP and WebDAV methods spoken by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DavMethod {
    Get,
    Post,
    Propfind,
    Search,
    Bproppatch,
    Bdelete,
}

impl DavMethod {
    /// The method token as it appears on the request line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Propfind => "PROPFIND",
            Self::Search => "SEARCH",
            Self::Bproppatch => "BPROPPATCH",
            Self::Bdelete => "BDELETE",
        }
    }
}

impl std::fmt::Display for DavMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request, built per call and consumed by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub method: DavMethod,
    /// Absolute server path (`/exchange/...`) or a full URL on the same
    /// server.
    pub path: String,
    pub body: Option<String>,
    pub headers: BTreeMap<String, String>,
}

/// A fully read HTTP response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    /// Response headers in wire order; repeated headers appear repeatedly.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Build a response with the given status and body and no headers.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a header, builder style.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// The body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Every value of the named header (case-insensitive), in wire order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// `true` for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `true` for 301, 302, 303, 307 and 308.
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }
}

// ---------------------------------------------------------------------------
// Core trait
// ---------------------------------------------------------------------------

/// Performs one HTTP exchange against the Exchange server.
///
/// Implementations must read the response body to completion before
/// returning so the underlying connection can be reused.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request and return the complete response.
    async fn exchange(&self, request: RequestEnvelope) -> Result<RawResponse>;
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

/// Production transport backed by a `reqwest` client.
///
/// Redirects are not followed automatically; the session needs to see the
/// `Set-Cookie` headers of the login redirect itself.
pub struct HttpTransport {
    client: reqwest::Client,
    base: url::Url,
}

impl HttpTransport {
    /// Create a transport for `host` (optionally `host:port`).
    pub fn new(host: &str, security: SecurityMode) -> Result<Self> {
        let base = url::Url::parse(&format!("{}://{host}/", security.scheme())).map_err(|e| {
            OwaError::InvalidRequest(format!("invalid exchange server `{host}`: {e}"))
        })?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| OwaError::Transport {
                method: "-".into(),
                target: base.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, base })
    }

    /// Resolve a request path against the server base URL.
    ///
    /// Exchange sometimes returns full URLs rather than paths; those are
    /// used unchanged.
    pub fn resolve(&self, path: &str) -> Result<url::Url> {
        let parsed = if path.starts_with("http://") || path.starts_with("https://") {
            url::Url::parse(path)
        } else {
            self.base.join(path)
        };
        parsed.map_err(|e| OwaError::InvalidRequest(format!("invalid request path `{path}`: {e}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(&self, request: RequestEnvelope) -> Result<RawResponse> {
        let url = self.resolve(&request.path)?;
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| OwaError::InvalidRequest(format!("method {}: {e}", request.method)))?;

        let transport_error = |reason: String| OwaError::Transport {
            method: request.method.to_string(),
            target: url.to_string(),
            reason,
        };

        let mut builder = self.client.request(method, url.clone());
        for (key, value) in &request.headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| OwaError::InvalidRequest(format!("invalid header name `{key}`: {e}")))?;
            let value = reqwest::header::HeaderValue::from_str(value).map_err(|e| {
                OwaError::InvalidRequest(format!("invalid header value for `{key}`: {e}"))
            })?;
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        debug!(method = %request.method, url = %url, "sending request");

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(format!("request failed: {e}")))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(format!("failed to read response body: {e}")))?;

        debug!(
            method = %request.method,
            url = %url,
            status = status,
            body_length = body.len(),
            "request completed"
        );

        Ok(RawResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
