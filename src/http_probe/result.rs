use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use hyper::{StatusCode, Version};
use thiserror::Error;

use crate::config::probe_config::ProbeTarget;

/// The first line of a response, rendered like `200 OK`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub code: StatusCode,
    pub reason: String,
    pub version: Version,
}

impl StatusLine {
    pub fn new(code: StatusCode, reason: Option<&[u8]>, version: Version) -> Self {
        let reason = match reason {
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            None => code.canonical_reason().unwrap_or_default().to_string(),
        };
        Self {
            code,
            reason,
            version,
        }
    }

    pub fn version_str(&self) -> &'static str {
        match self.version {
            Version::HTTP_09 => "HTTP/0.9",
            Version::HTTP_10 => "HTTP/1.0",
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_2 => "HTTP/2.0",
            Version::HTTP_3 => "HTTP/3.0",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code.as_u16())
        } else {
            write!(f, "{} {}", self.code.as_u16(), self.reason)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStage {
    Connect,
    Tls,
    Handshake,
    Request,
    Body,
    Timeout,
}

impl fmt::Display for TransportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportStage::Connect => "connect",
            TransportStage::Tls => "tls",
            TransportStage::Handshake => "handshake",
            TransportStage::Request => "request",
            TransportStage::Body => "body",
            TransportStage::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Why a single probe failed. Never fatal to the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    /// The base URL does not parse.
    #[error("{0}")]
    MalformedTarget(String),

    /// The address-substituted request could not be built.
    #[error("{0}")]
    RequestBuild(String),

    #[error("{message}")]
    Transport {
        stage: TransportStage,
        message: String,
    },

    /// Capture was requested but the artifact could not be written.
    #[error("write {}: {message}", path.display())]
    ArtifactWrite { path: PathBuf, message: String },

    /// The probe task panicked before producing an outcome.
    #[error("probe aborted: {0}")]
    Aborted(String),
}

impl ProbeFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeFailure::MalformedTarget(_) => "malformed target",
            ProbeFailure::RequestBuild(_) => "request build failure",
            ProbeFailure::Transport { .. } => "transport failure",
            ProbeFailure::ArtifactWrite { .. } => "artifact write failure",
            ProbeFailure::Aborted(_) => "aborted",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ProbeFailure::Transport {
                stage: TransportStage::Timeout,
                ..
            }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSuccess {
    pub status: StatusLine,
    /// From dispatch until the response headers arrived.
    pub elapsed: Duration,
}

/// What one probe produced. Exactly one of success or failure.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// The candidate as given in the request file.
    pub ip: String,
    /// The address actually connected to: the candidate, or the identity host for the baseline.
    /// Empty when the base URL could not be parsed.
    pub address: String,
    pub result: Result<ProbeSuccess, ProbeFailure>,
}

impl ProbeOutcome {
    pub fn new(
        target: &ProbeTarget,
        address: impl Into<String>,
        result: Result<ProbeSuccess, ProbeFailure>,
    ) -> Self {
        Self {
            ip: target.ip.clone(),
            address: address.into(),
            result,
        }
    }

    /// The label shown to the operator.
    pub fn display_address(&self) -> &str {
        if self.address.is_empty() {
            &self.ip
        } else {
            &self.address
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn status(&self) -> Option<&StatusLine> {
        self.result.as_ref().ok().map(|success| &success.status)
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.result.as_ref().ok().map(|success| success.elapsed)
    }

    pub fn failure(&self) -> Option<&ProbeFailure> {
        self.result.as_ref().err()
    }
}
