//! Properties file loading and validation.
//!
//! The settings file uses the fetchExc properties format: one
//! `key = value` per line, `#` starts a comment line, lines without `=`
//! are ignored.  A file ending in `.toml` is read as TOML instead, with the
//! same key names at the top level.
//!
//! Keys are checked against [`PROPERTIES`]: missing required keys are an
//! error, unsupported and unknown keys are reported and dropped.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::warn;

use owafetch_core::{Credentials, DEFAULT_FORM_LOGIN_PATH, SecurityMode};
use owafetch_relay::{DEFAULT_SMTP_HOST, DEFAULT_SMTP_PORT, SmtpSettings};

// ---------------------------------------------------------------------------
// Property table
// ---------------------------------------------------------------------------

/// How a property key is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyStatus {
    Required,
    Optional,
    /// Recognized fetchExc key this tool does not implement.
    Unsupported,
}

/// Every property key known to owafetch.
pub const PROPERTIES: &[(&str, PropertyStatus)] = &[
    ("ExchangeServer", PropertyStatus::Required),
    ("ExchangePath", PropertyStatus::Required),
    ("FBAPath", PropertyStatus::Optional),
    ("ExchangeUser", PropertyStatus::Unsupported),
    ("Username", PropertyStatus::Required),
    ("Password", PropertyStatus::Required),
    ("Domain", PropertyStatus::Required),
    ("Secure", PropertyStatus::Optional),
    ("Destination", PropertyStatus::Unsupported),
    ("ProxyHost", PropertyStatus::Unsupported),
    ("ProxyPort", PropertyStatus::Unsupported),
    ("Delete", PropertyStatus::Optional),
    ("All", PropertyStatus::Optional),
    ("DestinationAddress", PropertyStatus::Optional),
    ("ForceFrom", PropertyStatus::Unsupported),
    ("ForceFromAddr", PropertyStatus::Unsupported),
    ("MboxFile", PropertyStatus::Unsupported),
    ("ProcMail", PropertyStatus::Unsupported),
    ("MailServer", PropertyStatus::Optional),
    ("MailServerPort", PropertyStatus::Optional),
    ("MailServerUseTTLS", PropertyStatus::Optional),
    ("MailServerUser", PropertyStatus::Optional),
    ("MailServerPassword", PropertyStatus::Optional),
    ("NoEightBitMime", PropertyStatus::Unsupported),
];

/// Keys whose values are masked when properties are printed.
const SECRET_KEYS: &[&str] = &["Password", "MailServerPassword"];

fn status_of(key: &str) -> Option<PropertyStatus> {
    PROPERTIES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, status)| *status)
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Validated key/value pairs from a properties file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    /// Validate raw pairs: fail on missing required keys, drop (with a
    /// warning) unsupported and unknown ones.
    pub fn from_raw(raw: BTreeMap<String, String>) -> Result<Self> {
        let missing: Vec<&str> = PROPERTIES
            .iter()
            .filter(|(name, status)| {
                *status == PropertyStatus::Required && !raw.contains_key(*name)
            })
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            bail!("missing required properties: {}", missing.join(", "));
        }

        let mut values = BTreeMap::new();
        for (key, value) in raw {
            match status_of(&key) {
                Some(PropertyStatus::Unsupported) => {
                    warn!(key = %key, value = %value, "unsupported property, ignoring");
                }
                None => {
                    warn!(key = %key, value = %value, "unknown property, ignoring");
                }
                Some(_) => {
                    values.insert(key, value);
                }
            }
        }

        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The value of a key that [`Properties::from_raw`] guaranteed present.
    fn required(&self, key: &str) -> Result<&str> {
        self.get(key)
            .with_context(|| format!("missing required property `{key}`"))
    }

    /// `true` only for a case-insensitive `true`.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Key/value lines for display, secrets masked.
    pub fn display_lines(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|(key, value)| {
                if SECRET_KEYS.contains(&key.as_str()) {
                    format!("{key}: ********")
                } else {
                    format!("{key}: {value}")
                }
            })
            .collect()
    }
}

/// Parse the fetchExc `key = value` format.
///
/// Only the first `=` splits; the rest belongs to the value.  Later
/// occurrences of a key replace earlier ones.
pub fn parse_properties(content: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for line in content.lines() {
        if line.trim_start().starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        values.insert(key.to_string(), value.trim().to_string());
    }
    values
}

/// Parse a flat TOML table into string pairs.
fn parse_toml_properties(content: &str) -> Result<BTreeMap<String, String>> {
    let table: toml::Table = content.parse().context("invalid TOML properties file")?;
    let mut values = BTreeMap::new();
    for (key, value) in table {
        let value = match value {
            toml::Value::String(s) => s,
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            toml::Value::Float(f) => f.to_string(),
            other => bail!("property `{key}` must be a scalar, found {}", other.type_str()),
        };
        values.insert(key, value);
    }
    Ok(values)
}

/// Read and validate a properties file.
pub fn load_properties(path: &Path) -> Result<Properties> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read properties file {}", path.display()))?;

    let raw = if path.extension().is_some_and(|ext| ext == "toml") {
        parse_toml_properties(&content)?
    } else {
        parse_properties(&content)
    };

    Properties::from_raw(raw)
        .with_context(|| format!("invalid properties file {}", path.display()))
}

// ---------------------------------------------------------------------------
// Typed configuration
// ---------------------------------------------------------------------------

/// Everything a run needs, derived from [`Properties`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub server: String,
    pub security: SecurityMode,
    pub credentials: Credentials,
    pub fetch_all: bool,
    pub delete_after_forward: bool,
    /// Relay settings, present only when `DestinationAddress` is set.
    pub smtp: Option<SmtpSettings>,
}

impl FetchConfig {
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let server = props.required("ExchangeServer")?.to_string();
        let exchange_path = props.required("ExchangePath")?.trim_matches('/').to_string();
        let username = format!(
            "{}\\{}",
            props.required("Domain")?,
            props.required("Username")?
        );

        let credentials = Credentials {
            username,
            password: props.required("Password")?.to_string(),
            exchange_path,
            form_login_path: props
                .get("FBAPath")
                .unwrap_or(DEFAULT_FORM_LOGIN_PATH)
                .to_string(),
        };

        let smtp = match props.get("DestinationAddress") {
            Some(destination) => {
                let port = match props.get("MailServerPort") {
                    Some(p) => p
                        .parse::<u16>()
                        .with_context(|| format!("invalid MailServerPort `{p}`"))?,
                    None => DEFAULT_SMTP_PORT,
                };
                Some(SmtpSettings {
                    host: props.get("MailServer").unwrap_or(DEFAULT_SMTP_HOST).to_string(),
                    port,
                    starttls: props.flag("MailServerUseTTLS"),
                    username: props.get("MailServerUser").map(str::to_string),
                    password: props.get("MailServerPassword").map(str::to_string),
                    destination: destination.to_string(),
                })
            }
            None => None,
        };

        Ok(Self {
            server,
            security: SecurityMode::from_flag(props.flag("Secure")),
            credentials,
            fetch_all: props.flag("All"),
            delete_after_forward: props.flag("Delete"),
            smtp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
# fetchExc settings
ExchangeServer = mail.corp.example
ExchangePath = /exchange/jdoe/
Username = jdoe
Password = s3cr=t
Domain = CORP
Secure = TRUE
DestinationAddress = me@home.example
MailServerPort = 2525
ProxyHost = proxy.corp.example
Bogus = 1
not a property line
";

    fn sample_properties() -> Properties {
        Properties::from_raw(parse_properties(SAMPLE)).unwrap()
    }

    #[test]
    fn parse_splits_on_first_equals_and_skips_comments() {
        let raw = parse_properties(SAMPLE);
        assert_eq!(raw.get("Password").map(String::as_str), Some("s3cr=t"));
        assert_eq!(raw.get("ExchangeServer").map(String::as_str), Some("mail.corp.example"));
        assert!(!raw.keys().any(|k| k.starts_with('#')));
        assert!(!raw.contains_key("not a property line"));
    }

    #[test]
    fn unsupported_and_unknown_keys_are_dropped() {
        let props = sample_properties();
        assert_eq!(props.get("ProxyHost"), None);
        assert_eq!(props.get("Bogus"), None);
        assert_eq!(props.get("Domain"), Some("CORP"));
    }

    #[test]
    fn missing_required_keys_are_listed() {
        let raw = parse_properties("ExchangeServer = x\nUsername = u\n");
        let err = Properties::from_raw(raw).unwrap_err().to_string();
        assert!(err.contains("ExchangePath"));
        assert!(err.contains("Password"));
        assert!(err.contains("Domain"));
        assert!(!err.contains("ExchangeServer"));
    }

    #[test]
    fn fetch_config_from_sample() {
        let config = FetchConfig::from_properties(&sample_properties()).unwrap();
        assert_eq!(config.server, "mail.corp.example");
        assert_eq!(config.security, SecurityMode::Secure);
        assert_eq!(config.credentials.username, "CORP\\jdoe");
        assert_eq!(config.credentials.exchange_path, "exchange/jdoe");
        assert_eq!(config.credentials.form_login_path, "/exchweb/bin/auth/owaauth.dll");
        assert!(!config.fetch_all);
        assert!(!config.delete_after_forward);

        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.host, "localhost");
        assert_eq!(smtp.port, 2525);
        assert_eq!(smtp.destination, "me@home.example");
        assert!(!smtp.starttls);
        assert_eq!(smtp.username, None);
    }

    #[test]
    fn custom_login_path_and_flags() {
        let raw = parse_properties(
            "ExchangeServer=s\nExchangePath=exchange/u\nUsername=u\nPassword=p\nDomain=D\n\
             FBAPath=/owa/auth.owa\nAll=true\nDelete=True\nSecure=no\n",
        );
        let config = FetchConfig::from_properties(&Properties::from_raw(raw).unwrap()).unwrap();
        assert_eq!(config.credentials.form_login_path, "/owa/auth.owa");
        assert!(config.fetch_all);
        assert!(config.delete_after_forward);
        assert_eq!(config.security, SecurityMode::Plain);
        assert!(config.smtp.is_none());
    }

    #[test]
    fn bad_smtp_port_is_rejected() {
        let raw = parse_properties(
            "ExchangeServer=s\nExchangePath=e\nUsername=u\nPassword=p\nDomain=D\n\
             DestinationAddress=a@b\nMailServerPort=smtp\n",
        );
        let props = Properties::from_raw(raw).unwrap();
        assert!(FetchConfig::from_properties(&props).is_err());
    }

    #[test]
    fn display_masks_secrets() {
        let lines = sample_properties().display_lines();
        assert!(lines.contains(&"Password: ********".to_string()));
        assert!(lines.contains(&"Domain: CORP".to_string()));
        assert!(!lines.iter().any(|l| l.contains("s3cr=t")));
    }

    #[test]
    fn load_properties_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let props = load_properties(file.path()).unwrap();
        assert_eq!(props.get("Username"), Some("jdoe"));
    }

    #[test]
    fn load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(
            b"ExchangeServer = \"mail.corp.example\"\nExchangePath = \"exchange/jdoe\"\n\
              Username = \"jdoe\"\nPassword = \"pw\"\nDomain = \"CORP\"\nSecure = true\n\
              MailServerPort = 587\nDestinationAddress = \"me@home.example\"\n",
        )
        .unwrap();
        let props = load_properties(file.path()).unwrap();
        assert!(props.flag("Secure"));
        let config = FetchConfig::from_properties(&props).unwrap();
        assert_eq!(config.smtp.unwrap().port, 587);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_properties(&dir.path().join("absent.properties")).is_err());
    }
}
