//! In-process HTTP(S) servers standing in for candidate addresses.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode, Version};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// A fixed response sent for every request.
#[derive(Debug, Clone)]
pub struct Canned {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    delay: Option<Duration>,
}

impl Canned {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: body.into(),
            delay: None,
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self {
            status: StatusCode::FOUND,
            headers: vec![("Location".to_string(), location.to_string())],
            body: Vec::new(),
            delay: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn to_response(&self) -> Response<Full<Bytes>> {
        let mut response = Response::builder().status(self.status);
        for (name, value) in &self.headers {
            response = response.header(name.as_str(), value.as_str());
        }
        response
            .body(Full::new(Bytes::from(self.body.clone())))
            .expect("canned response")
    }
}

/// What a test server saw for one request.
#[derive(Debug, Clone)]
pub struct Recorded {
    /// `GET /path?query HTTP/1.1`, whatever form the client sent the target in.
    pub request_line: String,
    pub version: Version,
    /// `:authority` on HTTP/2, or the authority of an absolute-form target.
    pub authority: Option<String>,
    pub headers: Vec<(String, String)>,
    /// SNI sent by the client, TLS servers only.
    pub server_name: Option<String>,
}

impl Recorded {
    fn from_request(request: &Request<Incoming>, server_name: Option<String>) -> Self {
        let target = request
            .uri()
            .path_and_query()
            .map(|path| path.as_str())
            .unwrap_or("/");
        Self {
            request_line: format!("{} {target} {:?}", request.method(), request.version()),
            version: request.version(),
            authority: request.uri().authority().map(ToString::to_string),
            headers: request
                .headers()
                .iter()
                .map(|(name, value)| {
                    (name.to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned())
                })
                .collect(),
            server_name,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Self-signed certificate for one DNS name.
#[derive(Debug, Clone)]
pub struct TestCertificate {
    pub cert: CertificateDer<'static>,
    key: Vec<u8>,
}

impl TestCertificate {
    pub fn for_host(host: &str) -> Self {
        let certified = rcgen::generate_simple_self_signed(vec![host.to_string()])
            .expect("generate certificate");
        Self {
            cert: certified.cert.der().clone(),
            key: certified.key_pair.serialize_der(),
        }
    }

    fn acceptor(&self, alpn: &[&[u8]]) -> TlsAcceptor {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .expect("protocol versions")
            .with_no_client_auth()
            .with_single_cert(
                vec![self.cert.clone()],
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key.clone())),
            )
            .expect("server certificate");
        config.alpn_protocols = alpn.iter().map(|protocol| protocol.to_vec()).collect();
        TlsAcceptor::from(Arc::new(config))
    }
}

pub struct TestServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl TestServer {
    pub async fn http(response: Canned) -> Self {
        Self::start(response, None).await
    }

    /// TLS server that only speaks HTTP/1.1.
    pub async fn https(response: Canned, certificate: &TestCertificate) -> Self {
        Self::start(response, Some(certificate.acceptor(&[b"http/1.1"]))).await
    }

    /// TLS server that only speaks HTTP/2.
    pub async fn https_h2(response: Canned, certificate: &TestCertificate) -> Self {
        Self::start(response, Some(certificate.acceptor(&[b"h2"]))).await
    }

    /// Accepts connections and never answers.
    pub async fn silent() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    drop(stream);
                });
            }
        });
        Self {
            addr,
            requests: Arc::default(),
        }
    }

    async fn start(response: Canned, acceptor: Option<TlsAcceptor>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let requests: Arc<Mutex<Vec<Recorded>>> = Arc::default();
        let recorded = Arc::clone(&requests);

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let response = response.clone();
                let acceptor = acceptor.clone();
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    match acceptor {
                        None => serve(stream, response, None, recorded).await,
                        Some(acceptor) => {
                            let Ok(tls) = acceptor.accept(stream).await else {
                                return;
                            };
                            let server_name = tls.get_ref().1.server_name().map(str::to_string);
                            serve(tls, response, server_name, recorded).await;
                        }
                    }
                });
            }
        });

        Self { addr, requests }
    }

    /// The candidate string that makes a probe connect here.
    pub fn candidate(&self) -> String {
        self.addr.to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().expect("lock").clone()
    }
}

async fn serve<S>(stream: S, response: Canned, server_name: Option<String>, requests: Arc<Mutex<Vec<Recorded>>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |request: Request<Incoming>| {
        requests
            .lock()
            .expect("lock")
            .push(Recorded::from_request(&request, server_name.clone()));
        let response = response.clone();
        async move {
            if let Some(delay) = response.delay {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, Infallible>(response.to_response())
        }
    });

    let _ = auto::Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(stream), service)
        .await;
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("local addr")
}
