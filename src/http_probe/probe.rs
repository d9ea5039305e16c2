use std::sync::Arc;
use std::time::Duration;

use hyper::ext::ReasonPhrase;
use rustls::ClientConfig;
use tokio::time::{Instant, timeout_at};

use super::artifact::{self, ArtifactPaths, BodyCaptureError, artifact_key};
use super::builder::{Identity, ProbeRequest};
use super::prelude::*;
use super::report;
use super::tls::client_config;
use super::transport::{self, Exchange};
use crate::config::probe_config::{ProbeConfig, ProbeTarget};

/// Everything the probes of one run share, read-only.
pub struct ProbeContext {
    config: ProbeConfig,
    tls: Arc<ClientConfig>,
}

impl ProbeContext {
    pub fn new(config: ProbeConfig) -> Result<Self, rustls::Error> {
        let tls = client_config(&config)?;
        Ok(Self { config, tls })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }
}

/// Probe one candidate end to end: build the request, send it under the
/// configured timeout, persist artifacts if asked to. Never fails; every
/// error ends up in the outcome.
pub async fn probe_target(ctx: &ProbeContext, target: &ProbeTarget) -> ProbeOutcome {
    let identity = match Identity::parse(&ctx.config.base_url) {
        Ok(identity) => identity,
        Err(failure) => {
            log::warn!("[{}] {failure}", target.ip);
            return ProbeOutcome::new(target, "", Err(failure));
        }
    };
    let address = identity.connect_label(target);

    let result = run(ctx, &identity, target, &address).await;
    match &result {
        Ok(success) => log::debug!(
            "[{address}] {} {} in {:.3}s",
            success.status.version_str(),
            success.status,
            success.elapsed.as_secs_f64()
        ),
        Err(failure) => log::debug!("[{address}] {}: {failure}", failure.kind()),
    }

    ProbeOutcome::new(target, address, result)
}

async fn run(
    ctx: &ProbeContext,
    identity: &Identity,
    target: &ProbeTarget,
    address: &str,
) -> Result<ProbeSuccess, ProbeFailure> {
    let config = &ctx.config;
    let request = ProbeRequest::build(config, identity, address)?;

    let started = Instant::now();
    let deadline = started + config.timeout;
    let exchange = match timeout_at(deadline, transport::execute(&request, &ctx.tls)).await {
        Ok(Ok(exchange)) => exchange,
        Ok(Err(err)) => {
            return Err(ProbeFailure::Transport {
                stage: err.stage,
                message: request.mask(&format!("Get \"{}\": {}", request.outbound_url, err.describe())),
            });
        }
        Err(_) => return Err(timed_out(&request, config.timeout)),
    };
    let elapsed = started.elapsed();

    let Exchange { response, connection } = exchange;
    let (parts, body) = response.into_parts();
    let reason = parts.extensions.get::<ReasonPhrase>().map(ReasonPhrase::as_bytes);
    let status = StatusLine::new(parts.status, reason, parts.version);

    if config.captures_anything() {
        let key = artifact_key(&target.ip, &identity.authority);
        let paths = ArtifactPaths::new(&config.results_dir, &key);

        if config.capture_headers {
            artifact::write_header(&paths.header, &status, &parts.headers)
                .await
                .map_err(|err| ProbeFailure::ArtifactWrite {
                    path: paths.header.clone(),
                    message: err.to_string(),
                })?;
        }

        if config.capture_body {
            match artifact::write_body(&paths.body, body, deadline).await {
                Ok(bytes) => log::debug!("[{address}] wrote {bytes} body bytes to {}", paths.body.display()),
                Err(BodyCaptureError::Write(err)) => {
                    return Err(ProbeFailure::ArtifactWrite {
                        path: paths.body.clone(),
                        message: err.to_string(),
                    });
                }
                Err(BodyCaptureError::Read(err)) => {
                    return Err(ProbeFailure::Transport {
                        stage: TransportStage::Body,
                        message: request.mask(&format!(
                            "Get \"{}\": reading body: {}",
                            request.outbound_url,
                            report(&err)
                        )),
                    });
                }
                Err(BodyCaptureError::Timeout) => return Err(timed_out(&request, config.timeout)),
            }
        }
    }
    drop(connection);

    Ok(ProbeSuccess { status, elapsed })
}

fn timed_out(request: &ProbeRequest, timeout: Duration) -> ProbeFailure {
    ProbeFailure::Transport {
        stage: TransportStage::Timeout,
        message: request.mask(&format!(
            "Get \"{}\": request timed out after {:.2}s",
            request.outbound_url,
            timeout.as_secs_f64()
        )),
    }
}
