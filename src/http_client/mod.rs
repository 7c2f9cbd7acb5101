//! HTTP client construction for the API origin and its CDN hosts.
//!
//! The origin rejects requests that do not carry `Accept: text/css` and an
//! explicit `Accept-Encoding`, so every client built here sets them as
//! default headers. Proxied clients come in pairs: one routes plain-HTTP
//! targets, the other HTTPS targets, through the same upstream proxy.

mod transport;
mod user_agent;

pub use transport::{RequestError, TransportErrorKind};
pub use user_agent::{resolve_user_agent, BROWSER_USER_AGENT, USER_AGENT};

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING};
use reqwest::{Client, Proxy, Response};
use thiserror::Error;

use crate::config::ProxyDescriptor;
use crate::proxy::ProxyHandle;

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("Failed to create HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("Invalid proxy {label}: {source}")]
    Proxy {
        label: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Headers the API and CDN require on every request.
pub fn required_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("text/css"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
    headers
}

/// Shared HTTP client with a per-request timeout.
///
/// The timeout bounds connect plus response headers only; body streaming is
/// governed separately by the download stall and overall limits.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    user_agent: String,
    request_timeout: Duration,
}

impl HttpClient {
    pub fn new(user_agent: Option<&str>, request_timeout: Duration) -> Result<Self, HttpClientError> {
        let user_agent = resolve_user_agent(user_agent);
        let client = Self::build_client(&user_agent, request_timeout, None)?;
        Ok(Self {
            client,
            user_agent,
            request_timeout,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Build a reqwest client with the required headers and an optional proxy.
    pub(crate) fn build_client(
        user_agent: &str,
        connect_timeout: Duration,
        proxy: Option<Proxy>,
    ) -> Result<Client, HttpClientError> {
        let mut builder = Client::builder()
            .user_agent(user_agent)
            .default_headers(required_headers())
            .connect_timeout(connect_timeout)
            .cookie_store(true)
            .gzip(true)
            .deflate(true);

        if let Some(proxy) = proxy {
            builder = builder.proxy(proxy);
        }

        builder.build().map_err(HttpClientError::Build)
    }

    /// Build the HTTP/HTTPS client pair for one upstream proxy.
    ///
    /// SOCKS proxies carry every scheme, so both clients route through
    /// `Proxy::all`; HTTP(S) proxies are bound per target scheme.
    pub(crate) fn build_proxy_pair(
        user_agent: &str,
        connect_timeout: Duration,
        descriptor: &ProxyDescriptor,
    ) -> Result<(Client, Client), HttpClientError> {
        let url = descriptor.url();
        let proxy_err = |source| HttpClientError::Proxy {
            label: descriptor.display_label(),
            source,
        };

        let (for_http, for_https) = if descriptor.kind.is_socks() {
            (
                Proxy::all(&url).map_err(proxy_err)?,
                Proxy::all(&url).map_err(proxy_err)?,
            )
        } else {
            (
                Proxy::http(&url).map_err(proxy_err)?,
                Proxy::https(&url).map_err(proxy_err)?,
            )
        };

        Ok((
            Self::build_client(user_agent, connect_timeout, Some(for_http))?,
            Self::build_client(user_agent, connect_timeout, Some(for_https))?,
        ))
    }

    /// Send a GET and wait for response headers, bounded by the request timeout.
    ///
    /// Goes through the proxy's agent when a handle is given, otherwise
    /// connects directly. Non-success statuses are returned as responses;
    /// callers decide how to treat them.
    pub async fn get(&self, url: &str, via: Option<&ProxyHandle>) -> Result<Response, RequestError> {
        let client = via.map(ProxyHandle::client).unwrap_or(&self.client);
        let request = client.get(url);
        match tokio::time::timeout(self.request_timeout, request.send()).await {
            Ok(result) => result.map_err(RequestError::from),
            Err(_) => Err(RequestError::Timeout(self.request_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyKind;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_sends_required_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ping"))
            .and(header("accept", "text/css"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::new(None, Duration::from_secs(5)).unwrap();
        let resp = client
            .get(&format!("{}/api/ping", server.uri()), None)
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);

        let requests = server.received_requests().await.unwrap();
        let encoding = requests[0]
            .headers
            .get("accept-encoding")
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert_eq!(encoding, "gzip, deflate");
    }

    #[tokio::test]
    async fn test_error_status_is_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpClient::new(None, Duration::from_secs(5)).unwrap();
        let resp = client.get(&server.uri(), None).await.unwrap();
        assert_eq!(resp.status().as_u16(), 500);
    }

    #[tokio::test]
    async fn test_request_timeout_applies_to_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let client = HttpClient::new(None, Duration::from_millis(200)).unwrap();
        let err = client.get(&server.uri(), None).await.unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::TimedOut);
    }

    #[test]
    fn test_proxy_pair_builds_for_each_kind() {
        for kind in [ProxyKind::Http, ProxyKind::Https, ProxyKind::Socks5, ProxyKind::Socks5h] {
            let descriptor = ProxyDescriptor {
                kind,
                host: "127.0.0.1".to_string(),
                port: 3128,
                username: Some("u".to_string()),
                password: Some("p w".to_string()),
                label: None,
            };
            assert!(
                HttpClient::build_proxy_pair(USER_AGENT, Duration::from_secs(1), &descriptor).is_ok(),
                "{:?} proxy should build",
                kind
            );
        }
    }
}
