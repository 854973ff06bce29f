//! Authenticated OWA session.
//!
//! A [`Session`] owns the transport, the host it talks to, and the cookie
//! string obtained by form-based authentication.  Every protocol operation
//! goes through [`Session::request`], which merges the cookie into the
//! call's headers and performs exactly one exchange: no retries, no
//! re-authentication on 401.
//!
//! All operations take `&mut self`, so only one request can be in flight
//! per session.  A session is meant to be driven sequentially by a single
//! task for the length of one run.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::error::{OwaError, Result};
use crate::normalize::normalize_resource_name;
use crate::request_body::{
    XML_CONTENT_TYPE, delete_body, inbox_lookup_body, list_messages_body, mark_as_read_body,
};
use crate::response::{MessageSummary, ResponseParser};
use crate::transport::{
    DavMethod, HttpTransport, RawResponse, RequestEnvelope, SecurityMode, Transport, USER_AGENT,
};

/// Form-login endpoint used when the configuration does not name one.
pub const DEFAULT_FORM_LOGIN_PATH: &str = "/exchweb/bin/auth/owaauth.dll";

/// Redirect hops followed after the login POST while collecting cookies.
const MAX_LOGIN_REDIRECTS: usize = 5;

/// Status returned by successful WebDAV `PROPFIND`/`SEARCH`/batch calls.
const MULTI_STATUS: u16 = 207;

/// A connection to one Exchange server for the duration of a run.
pub struct Session {
    host: String,
    security: SecurityMode,
    /// `name=value;` pairs from the login response, absent until
    /// [`Session::authenticate`] has run.
    auth_cookie: Option<String>,
    transport: Box<dyn Transport>,
    parser: ResponseParser,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("security", &self.security)
            .field("authenticated", &self.auth_cookie.is_some())
            .finish()
    }
}

impl Session {
    /// Create an unauthenticated session using the `reqwest` transport.
    pub fn connect(host: &str, security: SecurityMode) -> Result<Self> {
        let transport = HttpTransport::new(host, security)?;
        Self::with_transport(host, security, Box::new(transport))
    }

    /// Create an unauthenticated session over a caller-supplied transport.
    pub fn with_transport(
        host: &str,
        security: SecurityMode,
        transport: Box<dyn Transport>,
    ) -> Result<Self> {
        Ok(Self {
            host: host.to_string(),
            security,
            auth_cookie: None,
            transport,
            parser: ResponseParser::new()?,
        })
    }

    /// The server host this session talks to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The transport security mode chosen at construction.
    pub fn security(&self) -> SecurityMode {
        self.security
    }

    /// The cookie string sent with every request, once authenticated.
    pub fn auth_cookie(&self) -> Option<&str> {
        self.auth_cookie.as_deref()
    }

    // -----------------------------------------------------------------------
    // Authentication
    // -----------------------------------------------------------------------

    /// Log in through the OWA login form and keep every cookie the server
    /// hands out.
    ///
    /// `username` carries its domain qualifier (`DOMAIN\user`).  Success is
    /// not verified here; a rejected login shows up as a 401 on the next
    /// request.  Calling this again replaces the stored cookie.
    pub async fn authenticate(
        &mut self,
        username: &str,
        password: &str,
        exchange_path: &str,
        form_login_path: &str,
    ) -> Result<()> {
        let destination = format!("https://{}/{exchange_path}/", self.host);
        let body = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("destination", &destination)
            .append_pair("username", username)
            .append_pair("password", password)
            .finish();

        let mut headers = BTreeMap::new();
        headers.insert(
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded".to_string(),
        );
        headers.insert("User-Agent".to_string(), USER_AGENT.to_string());

        let login_url = format!("{}://{}{form_login_path}", self.security.scheme(), self.host);
        let mut current = url::Url::parse(&login_url).map_err(|e| {
            OwaError::InvalidRequest(format!("invalid login url `{login_url}`: {e}"))
        })?;
        debug!(url = %login_url, username = username, "posting login form");

        let mut jar = CookieJar::default();
        let mut response = self
            .transport
            .exchange(RequestEnvelope {
                method: DavMethod::Post,
                path: login_url,
                body: Some(body),
                headers,
            })
            .await?;
        jar.absorb(&response);

        for _ in 0..MAX_LOGIN_REDIRECTS {
            let Some(next) = self.same_host_redirect(&current, &response) else {
                break;
            };
            debug!(location = %next, status = response.status, "following login redirect");

            let mut headers = BTreeMap::new();
            if let Some(cookie) = jar.header() {
                headers.insert("Cookie".to_string(), cookie);
            }
            response = self
                .transport
                .exchange(RequestEnvelope {
                    method: DavMethod::Get,
                    path: next.to_string(),
                    body: None,
                    headers,
                })
                .await?;
            jar.absorb(&response);
            current = next;
        }

        info!(
            host = %self.host,
            cookies = jar.len(),
            "form-based authentication completed"
        );
        self.auth_cookie = jar.header();
        Ok(())
    }

    /// The `Location` of a redirect resolved against `current`, if it stays
    /// on this session's host.
    fn same_host_redirect(&self, current: &url::Url, response: &RawResponse) -> Option<url::Url> {
        if !response.is_redirect() {
            return None;
        }
        let location = response.header_values("Location").next()?;
        let next = match current.join(location) {
            Ok(next) => next,
            Err(e) => {
                warn!(location = %location, error = %e, "ignoring unparseable login redirect");
                return None;
            }
        };
        let host = match next.port() {
            Some(port) => format!("{}:{port}", next.host_str()?),
            None => next.host_str()?.to_string(),
        };
        if !host.eq_ignore_ascii_case(&self.host) {
            warn!(location = %location, "not following login redirect to another host");
            return None;
        }
        Some(next)
    }

    // -----------------------------------------------------------------------
    // Request primitive
    // -----------------------------------------------------------------------

    /// Perform one authenticated request.
    ///
    /// `extra_headers` are merged with the stored cookie; the cookie wins if
    /// both set `Cookie`.  The response is returned whatever its status.
    pub async fn request(
        &mut self,
        method: DavMethod,
        path: &str,
        body: Option<String>,
        extra_headers: BTreeMap<String, String>,
    ) -> Result<RawResponse> {
        let mut headers = extra_headers;
        if let Some(cookie) = &self.auth_cookie {
            headers.retain(|k, _| !k.eq_ignore_ascii_case("cookie"));
            headers.insert("Cookie".to_string(), cookie.clone());
        }

        self.transport
            .exchange(RequestEnvelope {
                method,
                path: path.to_string(),
                body,
                headers,
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Path discovery
    // -----------------------------------------------------------------------

    /// Look up the user's root path from the mailbox landing page.
    ///
    /// # Errors
    ///
    /// [`OwaError::AccessDenied`] on 401, [`OwaError::MailboxNotFound`] on
    /// 404, [`OwaError::UnexpectedStatus`] on any other non-200 status and
    /// [`OwaError::MissingElement`] if the page has no `<BASE>` tag.
    pub async fn get_root_path(&mut self, exchange_path: &str) -> Result<String> {
        let path = format!("/{exchange_path}/");
        let response = self
            .request(DavMethod::Get, &path, None, BTreeMap::new())
            .await?;

        match response.status {
            200 => {}
            401 => return Err(OwaError::AccessDenied { path }),
            404 => return Err(OwaError::MailboxNotFound { path }),
            status => {
                return Err(OwaError::UnexpectedStatus {
                    method: DavMethod::Get.to_string(),
                    path,
                    status,
                });
            }
        }

        let root_path = self.parser.root_path(&response.text())?;
        info!(root_path = %root_path, "found user root path");
        Ok(root_path)
    }

    /// Look up the inbox path below `root_path`.
    pub async fn get_inbox_path(&mut self, root_path: &str) -> Result<String> {
        let path = normalize_resource_name(root_path);
        let response = self
            .request(
                DavMethod::Propfind,
                &path,
                Some(inbox_lookup_body()),
                xml_headers(true),
            )
            .await?;

        if response.status != MULTI_STATUS {
            return Err(OwaError::UnexpectedStatus {
                method: DavMethod::Propfind.to_string(),
                path,
                status: response.status,
            });
        }

        let inbox_path = self.parser.inbox_path(&response.text())?;
        info!(inbox_path = %inbox_path, "found inbox path");
        Ok(inbox_path)
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// List the messages of the inbox, oldest first.
    ///
    /// Only unread messages are returned unless `include_read` is set.
    /// Malformed entries are skipped (and logged) rather than failing the
    /// whole listing.
    pub async fn list_messages(
        &mut self,
        inbox_path: &str,
        include_read: bool,
    ) -> Result<Vec<MessageSummary>> {
        let path = normalize_resource_name(inbox_path);
        let response = self
            .request(
                DavMethod::Search,
                &path,
                Some(list_messages_body(include_read)),
                xml_headers(true),
            )
            .await?;

        if !response.is_success() {
            return Err(OwaError::UnexpectedStatus {
                method: DavMethod::Search.to_string(),
                path,
                status: response.status,
            });
        }

        let listing = self.parser.message_list(&response.text());
        if listing.skipped > 0 {
            warn!(skipped = listing.skipped, "some message entries could not be parsed");
        }
        Ok(listing.messages)
    }

    /// Fetch the raw MIME source of a message.
    ///
    /// `Translate: F` stops the server from rendering the message as HTML.
    /// The payload is returned untouched.
    pub async fn get_message(&mut self, href: &str) -> Result<Vec<u8>> {
        let path = normalize_resource_name(href);
        let mut headers = BTreeMap::new();
        headers.insert("Translate".to_string(), "F".to_string());

        let response = self.request(DavMethod::Get, &path, None, headers).await?;
        if !response.is_success() {
            return Err(OwaError::UnexpectedStatus {
                method: DavMethod::Get.to_string(),
                path,
                status: response.status,
            });
        }
        Ok(response.body)
    }

    /// Set the read flag of a message.  Returns whether the server
    /// answered 207.
    pub async fn mark_as_read(&mut self, inbox_path: &str, href: &str) -> Result<bool> {
        self.batch_mutation(DavMethod::Bproppatch, inbox_path, mark_as_read_body(href))
            .await
    }

    /// Permanently delete a message.  Returns whether the server answered
    /// 207.
    pub async fn delete_message(&mut self, inbox_path: &str, href: &str) -> Result<bool> {
        self.batch_mutation(DavMethod::Bdelete, inbox_path, delete_body(href))
            .await
    }

    async fn batch_mutation(
        &mut self,
        method: DavMethod,
        inbox_path: &str,
        body: String,
    ) -> Result<bool> {
        let path = collection_path(inbox_path);
        let response = self
            .request(method, &path, Some(body), xml_headers(false))
            .await?;

        if response.status != MULTI_STATUS {
            debug!(method = %method, path = %path, status = response.status, "batch mutation refused");
        }
        Ok(response.status == MULTI_STATUS)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Headers for an XML request body, with `Depth: 1` when the call
/// enumerates a collection.
fn xml_headers(depth_one: bool) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("Content-Type".to_string(), XML_CONTENT_TYPE.to_string());
    if depth_one {
        headers.insert("Depth".to_string(), "1".to_string());
    }
    headers
}

/// The inbox as a collection resource: normalized, with a trailing `/`.
fn collection_path(inbox_path: &str) -> String {
    let mut path = normalize_resource_name(inbox_path);
    // Unlike a plain `inbox + "/"`, an inbox path ending in `/` keeps a single slash.
    if !path.ends_with('/') {
        path.push('/');
    }
    path
}

/// Cookies collected across the login exchange, in first-seen order.
#[derive(Debug, Default)]
struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    /// Record every `Set-Cookie` of a response.  A later value for the same
    /// name replaces the earlier one in place.
    fn absorb(&mut self, response: &RawResponse) {
        for raw in response.header_values("Set-Cookie") {
            let Some((name, value)) = parse_set_cookie(raw) else {
                continue;
            };
            match self.cookies.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = value,
                None => self.cookies.push((name, value)),
            }
        }
    }

    fn len(&self) -> usize {
        self.cookies.len()
    }

    /// `name=value;` pairs concatenated, or `None` if no cookie was set.
    fn header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value};"))
                .collect(),
        )
    }
}

/// Split the `name=value` pair off a `Set-Cookie` header value, ignoring
/// its attributes.
fn parse_set_cookie(raw: &str) -> Option<(String, String)> {
    let pair = raw.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}
