//! Parsing of the request file: the URL to probe, the shared options and one
//! candidate address per line.
//!
//! Two formats are accepted. The line format (`request.txt`):
//!
//! ```text
//! url: https://example.com/
//! user-agent: curl/8.0
//! header-output: true
//! body-output: 0
//! cookie: session=abc
//! 1.2.3.4
//! 5.6.7.8
//! ```
//!
//! and a YAML document, selected by a `.yml` / `.yaml` extension, using the
//! field names of [`ProbeConfig`] plus an `ips` list.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use super::probe_config::{ProbeConfig, ProbeTarget, parse_timeout_secs};

#[derive(Debug, Error)]
pub enum RequestFileError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("line {line}: {message}")]
    InvalidLine { line: usize, message: String },

    #[error("invalid YAML request file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Everything a run needs: the shared config and the candidates, in file order.
#[derive(Debug, Clone)]
pub struct RequestFile {
    pub config: ProbeConfig,
    pub targets: Vec<ProbeTarget>,
}

#[derive(Deserialize)]
struct YamlRequestFile {
    #[serde(flatten)]
    config: ProbeConfig,

    #[serde(default)]
    ips: Vec<String>,
}

/// Empty, `0` and any casing of `false` are false. Everything else is true.
pub fn parse_bool(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}

impl RequestFile {
    pub fn load(path: &Path) -> Result<Self, RequestFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| RequestFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"));

        let request = if is_yaml {
            Self::parse_yaml(&text)?
        } else {
            Self::parse_lines(&text)?
        };

        log::info!(
            "Loaded {} candidate(s) from {}",
            request.targets.len(),
            path.display()
        );
        Ok(request)
    }

    pub fn parse_lines(text: &str) -> Result<Self, RequestFileError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut config = ProbeConfig::default();
        let mut ips = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(value) = line.strip_prefix("url:") {
                config.base_url = value.trim().to_string();
            } else if let Some(value) = line.strip_prefix("user-agent:") {
                config.user_agent = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("header-output:") {
                config.capture_headers = parse_bool(value);
            } else if let Some(value) = line.strip_prefix("body-output:") {
                config.capture_body = parse_bool(value);
            } else if let Some(value) = line.strip_prefix("cookie:") {
                config.cookie = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("insecure:") {
                config.insecure = parse_bool(value);
            } else if let Some(value) = line.strip_prefix("timeout:") {
                let secs: f64 = value.trim().parse().map_err(|_| RequestFileError::InvalidLine {
                    line: index + 1,
                    message: format!("timeout is not a number: {:?}", value.trim()),
                })?;
                config.timeout = parse_timeout_secs(secs).map_err(|message| {
                    RequestFileError::InvalidLine {
                        line: index + 1,
                        message,
                    }
                })?;
            } else {
                ips.push(line.to_string());
            }
        }

        Ok(Self::assemble(config, ips))
    }

    pub fn parse_yaml(text: &str) -> Result<Self, RequestFileError> {
        let file: YamlRequestFile = serde_yaml::from_str(text)?;
        let ips = file
            .ips
            .into_iter()
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty())
            .collect();
        Ok(Self::assemble(file.config, ips))
    }

    fn assemble(config: ProbeConfig, ips: Vec<String>) -> Self {
        if config.base_url.is_empty() {
            log::warn!("Request file has no url, every probe will fail");
        }

        let mut seen = HashSet::new();
        for ip in &ips {
            if !seen.insert(ip.as_str()) {
                log::warn!("Candidate {ip} is listed more than once, its artifacts will be overwritten");
            }
        }

        let mut targets: Vec<ProbeTarget> = ips.into_iter().map(ProbeTarget::new).collect();
        if targets.is_empty() {
            targets.push(ProbeTarget::baseline());
        }

        Self { config, targets }
    }
}
