//! Builds the outbound request for one candidate.
//!
//! The request connects to the candidate address but identifies as the host of
//! the base URL: TLS SNI, certificate verification and the `Host` header all use
//! the identity host. The outbound URL is derived textually, by replacing the
//! first occurrence of the identity authority in the base URL with the
//! candidate. A base URL that repeats the host elsewhere, e.g. in a query
//! parameter, only has its first occurrence replaced.

use std::net::IpAddr;

use http_body_util::Empty;
use hyper::body::Bytes;
use hyper::header::{COOKIE, HOST, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use hyper::{Method, Request, Uri, Version};
use rustls::pki_types::ServerName;
use url::{Host, Position, Url};

use super::prelude::*;
use super::transport::Protocol;
use crate::config::probe_config::{ProbeConfig, ProbeTarget};

/// The host named by the base URL.
#[derive(Debug, Clone)]
pub struct Identity {
    /// Host plus explicit non-default port, e.g. `example.com:8443`. Sent as `Host`.
    pub authority: String,
    /// Host without port or brackets. Sent as SNI.
    pub server_name: String,
    pub url: Url,
}

impl Identity {
    pub fn parse(base_url: &str) -> Result<Self, ProbeFailure> {
        let url = Url::parse(base_url)
            .map_err(|err| ProbeFailure::MalformedTarget(format!("parse \"{base_url}\": {err}")))?;

        let (Some(host_str), Some(host)) = (url.host_str(), url.host()) else {
            return Err(ProbeFailure::MalformedTarget(format!(
                "parse \"{base_url}\": url has no host"
            )));
        };

        let authority = match url.port() {
            Some(port) => format!("{host_str}:{port}"),
            None => host_str.to_string(),
        };
        let server_name = match host {
            Host::Domain(domain) => domain.to_string(),
            Host::Ipv4(addr) => addr.to_string(),
            Host::Ipv6(addr) => addr.to_string(),
        };

        Ok(Self {
            authority,
            server_name,
            url,
        })
    }

    /// The address to connect to for `target`: the candidate, or the identity itself for the baseline.
    pub fn connect_label(&self, target: &ProbeTarget) -> String {
        if target.is_baseline() {
            self.authority.clone()
        } else {
            target.ip.clone()
        }
    }

    /// Replace the first occurrence of the authority in `base_url` with `address`.
    ///
    /// Falls back to the normalised serialisation when `base_url` does not contain
    /// the authority verbatim (upper-case hosts, explicit default ports).
    pub fn substitute(&self, base_url: &str, address: &str) -> String {
        if base_url.contains(&self.authority) {
            base_url.replacen(&self.authority, address, 1)
        } else {
            self.url.as_str().replacen(&self.authority, address, 1)
        }
    }
}

/// Rewrites diagnostics so they name the base URL instead of the address-substituted one.
#[derive(Debug, Clone)]
pub struct UrlMask {
    base_url: String,
    outbound: String,
    normalized: Option<String>,
}

impl UrlMask {
    fn new(base_url: &str, outbound: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            outbound: outbound.to_string(),
            normalized: None,
        }
    }

    fn with_normalized(mut self, normalized: &str) -> Self {
        if normalized != self.outbound {
            self.normalized = Some(normalized.to_string());
        }
        self
    }

    /// The longer form is replaced first, since the raw form can be a prefix
    /// of the normalised one (`https://1.2.3.4` and `https://1.2.3.4/`).
    pub fn apply(&self, message: &str) -> String {
        let Some(normalized) = &self.normalized else {
            return message.replace(&self.outbound, &self.base_url);
        };
        let (longer, shorter) = if normalized.len() >= self.outbound.len() {
            (normalized, &self.outbound)
        } else {
            (&self.outbound, normalized)
        };
        message
            .replace(longer.as_str(), &self.base_url)
            .replace(shorter.as_str(), &self.base_url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectHost {
    Domain(String),
    Ip(IpAddr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAddr {
    pub host: ConnectHost,
    pub port: u16,
}

/// A fully prepared request for one candidate.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    /// The address-substituted URL, as derived from the base URL.
    pub outbound_url: String,
    pub connect: ConnectAddr,
    /// Present for `https` only.
    pub server_name: Option<ServerName<'static>>,
    origin_form: Uri,
    absolute_form: Uri,
    headers: HeaderMap,
    mask: UrlMask,
}

impl ProbeRequest {
    pub fn build(config: &ProbeConfig, identity: &Identity, address: &str) -> Result<Self, ProbeFailure> {
        let outbound_url = identity.substitute(&config.base_url, address);
        let mask = UrlMask::new(&config.base_url, &outbound_url);
        let fail = |message: String| ProbeFailure::RequestBuild(mask.apply(&message));

        let outbound = Url::parse(&outbound_url)
            .map_err(|err| fail(format!("parse \"{outbound_url}\": {err}")))?;
        let mask = mask.with_normalized(outbound.as_str());
        let fail = |message: String| ProbeFailure::RequestBuild(mask.apply(&message));

        let secure = match outbound.scheme() {
            "http" => false,
            "https" => true,
            other => {
                return Err(fail(format!(
                    "Get \"{outbound_url}\": unsupported protocol scheme \"{other}\""
                )));
            }
        };

        let host = match outbound.host() {
            Some(Host::Domain(domain)) => ConnectHost::Domain(domain.to_string()),
            Some(Host::Ipv4(addr)) => ConnectHost::Ip(IpAddr::V4(addr)),
            Some(Host::Ipv6(addr)) => ConnectHost::Ip(IpAddr::V6(addr)),
            None => return Err(fail(format!("Get \"{outbound_url}\": no host in request URL"))),
        };
        let port = outbound
            .port_or_known_default()
            .ok_or_else(|| fail(format!("Get \"{outbound_url}\": no port in request URL")))?;

        let server_name = if secure {
            let name = ServerName::try_from(identity.server_name.as_str()).map_err(|err| {
                fail(format!(
                    "Get \"{outbound_url}\": invalid TLS server name \"{}\": {err}",
                    identity.server_name
                ))
            })?;
            Some(name.to_owned())
        } else {
            None
        };

        let path_and_query = &outbound[Position::BeforePath..Position::AfterQuery];
        let origin_form = path_and_query
            .parse::<Uri>()
            .map_err(|err| fail(format!("Get \"{outbound_url}\": {err}")))?;
        let absolute_form = format!("{}://{}{}", outbound.scheme(), identity.authority, path_and_query)
            .parse::<Uri>()
            .map_err(|err| fail(format!("Get \"{outbound_url}\": {err}")))?;

        let mut headers = HeaderMap::new();
        let mut set_header = |name: HeaderName, value: &str| -> Result<(), ProbeFailure> {
            let value = HeaderValue::from_str(value)
                .map_err(|err| fail(format!("Get \"{outbound_url}\": invalid {name} header: {err}")))?;
            headers.insert(name, value);
            Ok(())
        };
        set_header(HOST, &identity.authority)?;
        set_header(USER_AGENT, config.effective_user_agent())?;
        if let Some(cookie) = config.effective_cookie() {
            set_header(COOKIE, cookie)?;
        }

        Ok(Self {
            connect: ConnectAddr { host, port },
            server_name,
            origin_form,
            absolute_form,
            headers,
            mask,
            outbound_url,
        })
    }

    pub fn is_secure(&self) -> bool {
        self.server_name.is_some()
    }

    pub fn mask(&self, message: &str) -> String {
        self.mask.apply(message)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The request to send once the protocol is known.
    /// HTTP/1.1 uses the origin form with an explicit `Host`; HTTP/2 carries the
    /// identity authority in the URI, which becomes `:authority`.
    pub fn to_http(&self, protocol: Protocol) -> Request<Empty<Bytes>> {
        let mut request = Request::new(Empty::new());
        *request.method_mut() = Method::GET;
        match protocol {
            Protocol::Http1 => {
                *request.uri_mut() = self.origin_form.clone();
                *request.headers_mut() = self.headers.clone();
            }
            Protocol::Http2 => {
                *request.uri_mut() = self.absolute_form.clone();
                *request.version_mut() = Version::HTTP_2;
                let mut headers = self.headers.clone();
                headers.remove(HOST);
                *request.headers_mut() = headers;
            }
        }
        request
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::config::probe_config::DEFAULT_USER_AGENT;

    fn build(base_url: &str, ip: &str) -> Result<ProbeRequest, ProbeFailure> {
        let config = ProbeConfig::new(base_url);
        let identity = Identity::parse(base_url)?;
        let address = identity.connect_label(&ProbeTarget::new(ip));
        ProbeRequest::build(&config, &identity, &address)
    }

    #[test]
    fn test_identity_parse() {
        let identity = Identity::parse("https://example.com/a?b=c").expect("parse");
        assert_eq!(identity.authority, "example.com");
        assert_eq!(identity.server_name, "example.com");

        let identity = Identity::parse("https://example.com:8443/").expect("parse");
        assert_eq!(identity.authority, "example.com:8443");
        assert_eq!(identity.server_name, "example.com");

        let identity = Identity::parse("https://example.com:443/").expect("parse");
        assert_eq!(identity.authority, "example.com");

        let identity = Identity::parse("http://[::1]:8080/").expect("parse");
        assert_eq!(identity.authority, "[::1]:8080");
        assert_eq!(identity.server_name, "::1");
    }

    #[test]
    fn test_malformed_base_url() {
        let err = Identity::parse("not a url").unwrap_err();
        assert!(matches!(err, ProbeFailure::MalformedTarget(_)));
        assert!(err.to_string().contains("not a url"));

        let err = Identity::parse("mailto:ops@example.com").unwrap_err();
        assert!(matches!(err, ProbeFailure::MalformedTarget(_)));
    }

    #[test]
    fn test_baseline_connects_to_identity() {
        let identity = Identity::parse("https://example.com/").expect("parse");
        assert_eq!(identity.connect_label(&ProbeTarget::baseline()), "example.com");

        let request = build("https://example.com/", "").expect("build");
        assert_eq!(request.outbound_url, "https://example.com/");
        assert_eq!(
            request.connect,
            ConnectAddr {
                host: ConnectHost::Domain("example.com".to_string()),
                port: 443
            }
        );
    }

    #[test]
    fn test_candidate_replaces_authority() {
        let request = build("https://example.com/index.html?x=1", "1.2.3.4").expect("build");
        assert_eq!(request.outbound_url, "https://1.2.3.4/index.html?x=1");
        assert_eq!(
            request.connect,
            ConnectAddr {
                host: ConnectHost::Ip("1.2.3.4".parse().expect("ip")),
                port: 443
            }
        );
        assert_eq!(
            request.server_name,
            Some(ServerName::try_from("example.com").expect("name"))
        );
        assert_eq!(request.headers().get(HOST).expect("host"), "example.com");
    }

    #[test]
    fn test_candidate_with_port_and_ipv6() {
        let request = build("http://example.com:8080/", "10.0.0.1:9000").expect("build");
        assert_eq!(request.outbound_url, "http://10.0.0.1:9000/");
        assert_eq!(request.connect.port, 9000);
        assert!(!request.is_secure());
        assert_eq!(request.headers().get(HOST).expect("host"), "example.com:8080");

        let request = build("https://example.com/", "[2001:db8::1]").expect("build");
        assert_eq!(
            request.connect.host,
            ConnectHost::Ip("2001:db8::1".parse().expect("ip"))
        );
    }

    #[test]
    fn test_only_first_occurrence_is_replaced() {
        let request = build("https://example.com/?next=https://example.com/home", "1.2.3.4").expect("build");
        assert_eq!(
            request.outbound_url,
            "https://1.2.3.4/?next=https://example.com/home"
        );
    }

    #[test]
    fn test_falls_back_to_normalized_url() {
        let request = build("https://EXAMPLE.com/", "1.2.3.4").expect("build");
        assert_eq!(request.outbound_url, "https://1.2.3.4/");
        assert_eq!(request.headers().get(HOST).expect("host"), "example.com");
    }

    #[test]
    fn test_headers() {
        let request = build("https://example.com/", "1.2.3.4").expect("build");
        assert_eq!(
            request.headers().get(USER_AGENT).expect("user agent"),
            DEFAULT_USER_AGENT
        );
        assert!(request.headers().get(COOKIE).is_none());

        let config = ProbeConfig {
            user_agent: Some("curl/8.0".to_string()),
            cookie: Some("session=abc".to_string()),
            ..ProbeConfig::new("https://example.com/")
        };
        let identity = Identity::parse(&config.base_url).expect("parse");
        let request = ProbeRequest::build(&config, &identity, "1.2.3.4").expect("build");
        assert_eq!(request.headers().get(USER_AGENT).expect("user agent"), "curl/8.0");
        assert_eq!(request.headers().get(COOKIE).expect("cookie"), "session=abc");
    }

    #[test]
    fn test_http_request_forms() {
        let request = build("https://example.com:8443/a/b?c=d#frag", "1.2.3.4:8443").expect("build");

        let http1 = request.to_http(Protocol::Http1);
        assert_eq!(http1.uri(), "/a/b?c=d");
        assert_eq!(http1.headers().get(HOST).expect("host"), "example.com:8443");

        let http2 = request.to_http(Protocol::Http2);
        assert_eq!(http2.uri(), "https://example.com:8443/a/b?c=d");
        assert_eq!(http2.version(), Version::HTTP_2);
        assert!(http2.headers().get(HOST).is_none());
    }

    #[test]
    fn test_build_failure_is_masked() {
        let err = build("https://example.com/", "bad ip").unwrap_err();
        let ProbeFailure::RequestBuild(message) = &err else {
            panic!("expected a build failure, got {err:?}");
        };
        assert!(message.contains("https://example.com/"), "{message}");
        assert!(!message.contains("https://bad ip/"), "{message}");
    }

    #[test]
    fn test_invalid_cookie_is_a_build_failure() {
        let config = ProbeConfig {
            cookie: Some("a=b\r\nX-Injected: 1".to_string()),
            ..ProbeConfig::new("https://example.com/")
        };
        let identity = Identity::parse(&config.base_url).expect("parse");
        let err = ProbeRequest::build(&config, &identity, "1.2.3.4").unwrap_err();
        assert!(matches!(err, ProbeFailure::RequestBuild(_)));
        assert!(!err.to_string().contains("https://1.2.3.4/"));
    }

    #[test]
    fn test_mask_replaces_both_forms() {
        let mask = UrlMask::new("https://example.com", "https://1.2.3.4").with_normalized("https://1.2.3.4/");
        assert_eq!(
            mask.apply("Get \"https://1.2.3.4/\": refused"),
            "Get \"https://example.com\": refused"
        );
        assert_eq!(
            mask.apply("Get \"https://1.2.3.4\": refused"),
            "Get \"https://example.com\": refused"
        );
    }

    #[test]
    fn test_mask_prefers_the_longer_form() {
        let mask = UrlMask::new("https://Example.com:443", "https://1.2.3.4:443/").with_normalized("https://1.2.3.4/");
        assert_eq!(
            mask.apply("connect https://1.2.3.4:443/ then https://1.2.3.4/"),
            "connect https://Example.com:443 then https://Example.com:443"
        );
    }
}
