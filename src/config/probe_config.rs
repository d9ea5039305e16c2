use std::path::PathBuf;
use std::time::Duration;

use rustls::pki_types::CertificateDer;
use serde::{Deserialize, Deserializer};

/// User agent sent when the request file does not provide one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/78.0.3904.108 Safari/537.36";

/// Upper bound for connect, TLS handshake, request and response headers of one probe.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Directory that receives the header and body artifacts.
pub const DEFAULT_RESULTS_DIR: &str = "result";

/// Settings shared by every probe of a run.
/// Built once from the request file and never mutated while probes are running.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// The full URL to request. Its host is the identity presented through SNI and `Host`.
    #[serde(rename = "url")]
    pub base_url: String,

    /// Overrides [`DEFAULT_USER_AGENT`].
    pub user_agent: Option<String>,

    /// Sent verbatim as the `Cookie` header when non-empty.
    pub cookie: Option<String>,

    /// Persist the status line and raw header block per candidate.
    #[serde(rename = "header_output")]
    pub capture_headers: bool,

    /// Persist the raw body bytes per candidate.
    #[serde(rename = "body_output")]
    pub capture_body: bool,

    #[serde(rename = "timeout_seconds", deserialize_with = "deserialize_duration_secs")]
    pub timeout: Duration,

    /// Skip certificate verification. SNI is still sent.
    pub insecure: bool,

    #[serde(skip)]
    pub results_dir: PathBuf,

    /// Trust anchors added on top of the bundled web PKI roots.
    #[serde(skip)]
    pub extra_roots: Vec<CertificateDer<'static>>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            user_agent: None,
            cookie: None,
            capture_headers: false,
            capture_body: false,
            timeout: DEFAULT_TIMEOUT,
            insecure: false,
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            extra_roots: Vec::new(),
        }
    }
}

impl ProbeConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn effective_user_agent(&self) -> &str {
        match self.user_agent.as_deref() {
            Some(ua) if !ua.is_empty() => ua,
            _ => DEFAULT_USER_AGENT,
        }
    }

    /// The cookie to send, if any. Empty strings count as unset.
    pub fn effective_cookie(&self) -> Option<&str> {
        self.cookie.as_deref().filter(|cookie| !cookie.is_empty())
    }

    pub fn captures_anything(&self) -> bool {
        self.capture_headers || self.capture_body
    }
}

pub(crate) fn parse_timeout_secs(value: f64) -> Result<Duration, String> {
    if !value.is_finite() || value <= 0.0 {
        return Err(format!("timeout must be a positive number of seconds, got {value}"));
    }
    Duration::try_from_secs_f64(value).map_err(|err| err.to_string())
}

fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    parse_timeout_secs(secs).map_err(serde::de::Error::custom)
}

/// One candidate address. An empty `ip` is the baseline probe against the hostname itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProbeTarget {
    pub ip: String,
}

impl ProbeTarget {
    pub fn new(ip: impl Into<String>) -> Self {
        Self { ip: ip.into() }
    }

    pub fn baseline() -> Self {
        Self::default()
    }

    pub fn is_baseline(&self) -> bool {
        self.ip.is_empty()
    }
}
