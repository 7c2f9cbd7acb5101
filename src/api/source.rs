//! HTTP-backed page source and creator profile lookup.

use async_trait::async_trait;
use serde_json::Value;

use super::paginator::{PageError, PageSource};
use super::{parse_posts, Post};
use crate::services::context::Transport;
use crate::target::discovery::is_posts_payload;
use crate::target::{DiscoveryPolicy, ResolvedTarget};

/// Pages of one creator's posts from the API host.
pub struct ApiPageSource<'a> {
    transport: &'a Transport,
    target: &'a ResolvedTarget,
    api_host: &'a str,
    service: &'a str,
    user_id: &'a str,
    policy: &'a DiscoveryPolicy,
}

impl<'a> ApiPageSource<'a> {
    pub fn new(
        transport: &'a Transport,
        target: &'a ResolvedTarget,
        api_host: &'a str,
        service: &'a str,
        user_id: &'a str,
        policy: &'a DiscoveryPolicy,
    ) -> Self {
        Self {
            transport,
            target,
            api_host,
            service,
            user_id,
            policy,
        }
    }
}

#[async_trait]
impl<'a> PageSource for ApiPageSource<'a> {
    async fn fetch_page(&self, offset: usize) -> Result<Vec<Post>, PageError> {
        let url = self
            .target
            .posts_url(self.api_host, self.service, self.user_id, offset);
        let value = self
            .transport
            .get_json_with_retry(&url, self.policy, is_posts_payload)
            .await
            .map_err(|e| PageError::Fetch {
                offset,
                message: e.to_string(),
            })?;
        parse_posts(value).map_err(|message| PageError::Malformed { offset, message })
    }
}

fn has_name(value: &Value) -> bool {
    value
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|name| !name.trim().is_empty())
}

/// Look up a creator's display name from their profile.
///
/// Best effort: a single attempt, `None` on any failure.
pub async fn fetch_creator_name(
    transport: &Transport,
    target: &ResolvedTarget,
    service: &str,
    user_id: &str,
) -> Option<String> {
    let url = target.profile_url(target.base_domain(), service, user_id);
    let policy = DiscoveryPolicy {
        max_attempts: 1,
        ..DiscoveryPolicy::default()
    };
    match transport.get_json_with_retry(&url, &policy, has_name).await {
        Ok(value) => value
            .get("name")
            .and_then(Value::as_str)
            .map(|name| name.trim().to_string()),
        Err(e) => {
            tracing::debug!("Profile lookup for {}/{} failed: {}", service, user_id, e);
            None
        }
    }
}
