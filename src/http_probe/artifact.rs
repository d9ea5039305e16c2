//! Raw response artifacts, one header file and one body file per candidate.

use std::path::{Path, PathBuf};

use http_body_util::BodyExt;
use hyper::HeaderMap;
use hyper::body::Incoming;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::{Instant, timeout_at};

use super::result::StatusLine;

/// File name key for a candidate. Colons from IPv6 literals or `host:port`
/// are not portable in file names and become dots.
pub fn artifact_key(ip: &str, identity_authority: &str) -> String {
    let key = if ip.is_empty() { identity_authority } else { ip };
    key.replace(':', ".")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub header: PathBuf,
    pub body: PathBuf,
}

impl ArtifactPaths {
    pub fn new(results_dir: &Path, key: &str) -> Self {
        Self {
            header: results_dir.join(format!("{key}_header.txt")),
            body: results_dir.join(format!("{key}_body.txt")),
        }
    }
}

/// `content-type` becomes `Content-Type`. hyper hands names over lowercased.
fn canonical_name(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let out = if upper { c.to_ascii_uppercase() } else { c };
            upper = c == '-';
            out
        })
        .collect()
}

/// The status line, then every header as received, one per line.
pub fn render_header_block(status: &StatusLine, headers: &HeaderMap) -> Vec<u8> {
    let mut block = format!("{status}\n").into_bytes();
    for (name, value) in headers {
        block.extend_from_slice(canonical_name(name.as_str()).as_bytes());
        block.extend_from_slice(b": ");
        block.extend_from_slice(value.as_bytes());
        block.extend_from_slice(b"\r\n");
    }
    block
}

pub async fn write_header(path: &Path, status: &StatusLine, headers: &HeaderMap) -> std::io::Result<()> {
    tokio::fs::write(path, render_header_block(status, headers)).await
}

#[derive(Debug)]
pub enum BodyCaptureError {
    /// The artifact file could not be created or written.
    Write(std::io::Error),
    /// The connection failed while the body was streaming.
    Read(hyper::Error),
    /// The probe deadline passed before the body was complete.
    Timeout,
}

/// Stream the body into `path` frame by frame, unaltered. Returns the byte count.
pub async fn write_body(path: &Path, mut body: Incoming, deadline: Instant) -> Result<u64, BodyCaptureError> {
    let mut file = File::create(path).await.map_err(BodyCaptureError::Write)?;
    let mut written = 0u64;

    loop {
        let frame = match timeout_at(deadline, body.frame()).await {
            Err(_) => return Err(BodyCaptureError::Timeout),
            Ok(None) => break,
            Ok(Some(frame)) => frame.map_err(BodyCaptureError::Read)?,
        };
        if let Some(data) = frame.data_ref() {
            file.write_all(data).await.map_err(BodyCaptureError::Write)?;
            written += data.len() as u64;
        }
    }

    file.flush().await.map_err(BodyCaptureError::Write)?;
    Ok(written)
}
