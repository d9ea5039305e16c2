use std::error::Error as StdError;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::Response;
use hyper::body::Incoming;
use hyper::client::conn::{http1, http2};
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;

use super::builder::{ConnectAddr, ConnectHost, ProbeRequest};
use super::prelude::*;
use super::report;

/// Wire protocol spoken on an established connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http1,
    Http2,
}

#[derive(Debug)]
pub struct TransportError {
    pub stage: TransportStage,
    source: Box<dyn StdError + Send + Sync>,
}

impl TransportError {
    fn new(stage: TransportStage, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    /// The full cause chain on one line.
    pub fn describe(&self) -> String {
        report(&*self.source)
    }
}

/// Aborts the task driving the connection once the response is no longer needed.
pub struct ConnectionGuard(JoinHandle<()>);

impl ConnectionGuard {
    fn spawn<F>(connection: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self(tokio::spawn(connection))
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// A response whose body can still be read while `connection` is alive.
pub struct Exchange {
    pub response: Response<Incoming>,
    pub connection: ConnectionGuard,
}

async fn connect(addr: &ConnectAddr) -> std::io::Result<TcpStream> {
    match &addr.host {
        ConnectHost::Domain(domain) => TcpStream::connect((domain.as_str(), addr.port)).await,
        ConnectHost::Ip(ip) => TcpStream::connect(SocketAddr::new(*ip, addr.port)).await,
    }
}

/// Connect to the candidate address and send the request.
///
/// TLS uses the identity host as server name, so the certificate is checked
/// against the hostname even though the socket points at the candidate. ALPN
/// decides between HTTP/2 and HTTP/1.1. Redirects are never followed: the
/// connection-level client hands back the first response as is.
pub async fn execute(request: &ProbeRequest, tls: &Arc<ClientConfig>) -> Result<Exchange, TransportError> {
    let tcp = connect(&request.connect)
        .await
        .map_err(|err| TransportError::new(TransportStage::Connect, err))?;
    let _ = tcp.set_nodelay(true);

    let Some(server_name) = &request.server_name else {
        return exchange(tcp, Protocol::Http1, request).await;
    };

    let stream = TlsConnector::from(Arc::clone(tls))
        .connect(server_name.clone(), tcp)
        .await
        .map_err(|err| TransportError::new(TransportStage::Tls, err))?;

    let protocol = if stream.get_ref().1.alpn_protocol() == Some(&b"h2"[..]) {
        Protocol::Http2
    } else {
        Protocol::Http1
    };
    log::debug!("Negotiated {protocol:?} with {}", request.outbound_url);

    exchange(stream, protocol, request).await
}

async fn exchange<S>(stream: S, protocol: Protocol, request: &ProbeRequest) -> Result<Exchange, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let http_request = request.to_http(protocol);

    match protocol {
        Protocol::Http1 => {
            let (mut sender, connection) = http1::handshake(io)
                .await
                .map_err(|err| TransportError::new(TransportStage::Handshake, err))?;
            let connection = ConnectionGuard::spawn(async move {
                if let Err(err) = connection.await {
                    log::debug!("HTTP/1.1 connection ended: {err}");
                }
            });
            let response = sender
                .send_request(http_request)
                .await
                .map_err(|err| TransportError::new(TransportStage::Request, err))?;
            Ok(Exchange { response, connection })
        }
        Protocol::Http2 => {
            let (mut sender, connection) = http2::handshake(TokioExecutor::new(), io)
                .await
                .map_err(|err| TransportError::new(TransportStage::Handshake, err))?;
            let connection = ConnectionGuard::spawn(async move {
                if let Err(err) = connection.await {
                    log::debug!("HTTP/2 connection ended: {err}");
                }
            });
            let response = sender
                .send_request(http_request)
                .await
                .map_err(|err| TransportError::new(TransportStage::Request, err))?;
            Ok(Exchange { response, connection })
        }
    }
}
