//! One-shot probe for a working API host.
//!
//! The probe requests the first page of a creator's posts and only accepts a
//! body that looks like a posts listing. The result is cached by the caller;
//! failure is fatal for that creator and is not retried by later passes.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use super::ResolvedTarget;
use crate::services::context::Transport;

/// Bounds for the probe and for other small JSON API calls.
#[derive(Debug, Clone)]
pub struct DiscoveryPolicy {
    pub max_attempts: u32,
    /// Linear backoff step between ordinary failed attempts.
    pub backoff_step: Duration,
    /// Exponential backoff base after an HTTP 429.
    pub rate_limit_base: Duration,
    /// Ceiling for any 429 wait, including a server `Retry-After`.
    pub rate_limit_cap: Duration,
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(1),
            rate_limit_base: Duration::from_secs(1),
            rate_limit_cap: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("No working API host for {service}/{user_id} at {host} after {attempts} attempts: {last_error}")]
    NoWorkingHost {
        host: String,
        service: String,
        user_id: String,
        attempts: u32,
        last_error: String,
    },
}

/// A posts listing is either a bare array or an object with a `posts` array.
pub fn is_posts_payload(value: &Value) -> bool {
    match value {
        Value::Array(_) => true,
        Value::Object(map) => map.get("posts").is_some_and(Value::is_array),
        _ => false,
    }
}

/// Probe the base domain and return the host to use for API calls.
pub async fn discover_api_host(
    transport: &Transport,
    target: &ResolvedTarget,
    service: &str,
    user_id: &str,
    policy: &DiscoveryPolicy,
) -> Result<String, DiscoveryError> {
    let host = target.base_domain();
    let url = target.posts_url(host, service, user_id, 0);

    match transport
        .get_json_with_retry(&url, policy, is_posts_payload)
        .await
    {
        Ok(_) => {
            tracing::info!("Using API host {} for {}/{}", host, service, user_id);
            Ok(host.to_string())
        }
        Err(e) => Err(DiscoveryError::NoWorkingHost {
            host: host.to_string(),
            service: service.to_string(),
            user_id: user_id.to_string(),
            attempts: policy.max_attempts.max(1),
            last_error: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::HttpClient;
    use crate::proxy::ProxyPool;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy() -> DiscoveryPolicy {
        DiscoveryPolicy {
            max_attempts: 3,
            backoff_step: Duration::from_millis(10),
            rate_limit_base: Duration::from_millis(10),
            rate_limit_cap: Duration::from_millis(50),
        }
    }

    async fn setup() -> (MockServer, Transport, ResolvedTarget) {
        let server = MockServer::start().await;
        let addr = server.address().to_string();
        let target = ResolvedTarget::with_origin("http", &addr, vec![]);
        let http = HttpClient::new(None, Duration::from_secs(5)).unwrap();
        let transport = Transport::new(http, Arc::new(ProxyPool::empty()));
        (server, transport, target)
    }

    #[test]
    fn test_payload_shapes() {
        assert!(is_posts_payload(&json!([])));
        assert!(is_posts_payload(&json!({"posts": [{"id": "1"}]})));
        assert!(!is_posts_payload(&json!({"posts": "nope"})));
        assert!(!is_posts_payload(&json!({"error": "not found"})));
        assert!(!is_posts_payload(&json!("text")));
    }

    #[tokio::test]
    async fn test_discovers_host_from_array_response() {
        let (server, transport, target) = setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/patreon/user/42/posts"))
            .and(query_param("o", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let host = discover_api_host(&transport, &target, "patreon", "42", &fast_policy())
            .await
            .unwrap();
        assert_eq!(host, target.base_domain());
    }

    #[tokio::test]
    async fn test_retries_after_rate_limit() {
        let (server, transport, target) = setup().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "0"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"posts": []})))
            .mount(&server)
            .await;

        let host = discover_api_host(&transport, &target, "patreon", "42", &fast_policy()).await;
        assert!(host.is_ok());
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_bounded_attempts() {
        let (server, transport, target) = setup().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = discover_api_host(&transport, &target, "patreon", "42", &fast_policy())
            .await
            .unwrap_err();
        let DiscoveryError::NoWorkingHost { attempts, .. } = err;
        assert_eq!(attempts, 3);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }
}
