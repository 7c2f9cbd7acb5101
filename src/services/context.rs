//! Per-creator scrape context and the proxied request layer under it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::Response;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::api::PaginationConfig;
use crate::blacklist::{BlacklistPolicy, BlacklistStore};
use crate::config::CreatorSettings;
use crate::http_client::{HttpClient, RequestError, TransportErrorKind};
use crate::proxy::{ProxyHandle, ProxyPool};
use crate::rate_limit::{is_rate_limit_status, linear_delay, rate_limit_delay};
use crate::services::download::{RetryPolicy, StreamLimits};
use crate::target::{discovery, DiscoveryError, DiscoveryPolicy, ResolvedTarget};

/// Failure fetching a small JSON document from the API.
#[derive(Debug, Error)]
pub enum JsonFetchError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("rate limited (HTTP 429)")]
    RateLimited { retry_after: Option<String> },

    #[error("HTTP {0}")]
    Status(u16),

    #[error("unexpected response body: {0}")]
    Body(String),
}

/// HTTP client plus proxy selection and health reporting.
///
/// Owned by one creator run; the proxy pool behind it is shared.
pub struct Transport {
    http: HttpClient,
    proxies: Arc<ProxyPool>,
    /// Set once the "all proxies cooling down" warning has been logged.
    proxy_fallback_logged: AtomicBool,
}

impl Transport {
    pub fn new(http: HttpClient, proxies: Arc<ProxyPool>) -> Self {
        Self {
            http,
            proxies,
            proxy_fallback_logged: AtomicBool::new(false),
        }
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn proxies(&self) -> &Arc<ProxyPool> {
        &self.proxies
    }

    /// Pick a proxy for `url`, or `None` to go direct.
    pub fn acquire_proxy(&self, url: &str) -> Option<ProxyHandle> {
        if self.proxies.is_empty() {
            return None;
        }
        let handle = self.proxies.select_proxy(url);
        if handle.is_none() {
            if !self.proxy_fallback_logged.swap(true, Ordering::Relaxed) {
                tracing::warn!(
                    "All {} proxies are cooling down, falling back to direct connections",
                    self.proxies.len()
                );
            } else {
                tracing::debug!("No proxy available for {}, connecting directly", url);
            }
        }
        handle
    }

    /// Report a request outcome for the proxy that carried it, if any.
    pub fn report(&self, handle: Option<&ProxyHandle>, error: Option<TransportErrorKind>) {
        if let Some(handle) = handle {
            self.proxies.report_outcome(handle, error);
        }
    }

    /// GET through the next available proxy.
    ///
    /// The proxy is credited once headers arrive (unless the proxy itself
    /// refused with 407); the handle is returned so body-stream failures can
    /// still be attributed to it.
    pub async fn get(&self, url: &str) -> Result<(Response, Option<ProxyHandle>), RequestError> {
        let handle = self.acquire_proxy(url);
        match self.http.get(url, handle.as_ref()).await {
            Ok(response) => {
                let status = response.status().as_u16();
                let outcome = (status == 407).then_some(TransportErrorKind::Status(407));
                self.report(handle.as_ref(), outcome);
                Ok((response, handle))
            }
            Err(e) => {
                self.report(handle.as_ref(), Some(e.kind()));
                Err(e)
            }
        }
    }

    /// Fetch and parse a JSON document, rejecting bodies `accept` refuses.
    pub async fn get_json(
        &self,
        url: &str,
        accept: fn(&Value) -> bool,
    ) -> Result<Value, JsonFetchError> {
        let (response, _) = self.get(url).await?;
        let status = response.status().as_u16();

        if is_rate_limit_status(status) {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Err(JsonFetchError::RateLimited { retry_after });
        }
        if !response.status().is_success() {
            return Err(JsonFetchError::Status(status));
        }

        let timeout = self.http.request_timeout();
        let body = match tokio::time::timeout(timeout, response.text()).await {
            Ok(body) => body.map_err(RequestError::from)?,
            Err(_) => return Err(RequestError::Timeout(timeout).into()),
        };

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| JsonFetchError::Body(format!("invalid JSON: {}", e)))?;
        if !accept(&value) {
            return Err(JsonFetchError::Body("unexpected JSON shape".to_string()));
        }
        Ok(value)
    }

    /// [`get_json`](Self::get_json) with bounded retries: linear backoff for
    /// ordinary failures, capped exponential backoff after a 429.
    pub async fn get_json_with_retry(
        &self,
        url: &str,
        policy: &DiscoveryPolicy,
        accept: fn(&Value) -> bool,
    ) -> Result<Value, JsonFetchError> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let err = match self.get_json(url, accept).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if attempt >= max_attempts {
                return Err(err);
            }

            let delay = match &err {
                JsonFetchError::RateLimited { retry_after } => rate_limit_delay(
                    attempt - 1,
                    retry_after.as_deref(),
                    policy.rate_limit_base,
                    policy.rate_limit_cap,
                ),
                _ => linear_delay(attempt, policy.backoff_step),
            };
            tracing::warn!(
                "Request to {} failed ({}), attempt {}/{}; retrying in {:?}",
                url,
                err,
                attempt,
                max_attempts,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Tunables for every stage of the pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub pagination: PaginationConfig,
    pub discovery: DiscoveryPolicy,
    pub retry: RetryPolicy,
    pub stream: StreamLimits,
    pub blacklist: BlacklistPolicy,
}

/// Everything one creator's scrape needs, threaded by reference through the
/// paginator, worker pool and retry passes.
pub struct ScraperContext {
    settings: CreatorSettings,
    username: String,
    target: ResolvedTarget,
    output_dir: PathBuf,
    transport: Transport,
    blacklist: Arc<BlacklistStore>,
    options: PipelineOptions,
    api_host: OnceCell<String>,
}

impl ScraperContext {
    pub fn new(
        settings: CreatorSettings,
        username: String,
        target: ResolvedTarget,
        output_dir: PathBuf,
        transport: Transport,
        blacklist: Arc<BlacklistStore>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            settings,
            username,
            target,
            output_dir,
            transport,
            blacklist,
            options,
            api_host: OnceCell::new(),
        }
    }

    pub fn settings(&self) -> &CreatorSettings {
        &self.settings
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn target(&self) -> &ResolvedTarget {
        &self.target
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn blacklist(&self) -> &Arc<BlacklistStore> {
        &self.blacklist
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// The working API host, probed on first use and cached for the run.
    pub async fn api_host(&self) -> Result<&str, DiscoveryError> {
        self.api_host
            .get_or_try_init(|| {
                discovery::discover_api_host(
                    &self.transport,
                    &self.target,
                    &self.settings.service,
                    &self.settings.user_id,
                    &self.options.discovery,
                )
            })
            .await
            .map(String::as_str)
    }
}
