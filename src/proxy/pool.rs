//! Round-robin proxy pool with per-proxy cooldown.
//!
//! Health state lives behind a single mutex so concurrent workers can
//! select and report without losing updates. Proxies are never removed,
//! only excluded from selection until their cooldown passes.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use reqwest::Client;
use tokio::time::Instant;

use crate::config::{ProxySettings, RotationMode};
use crate::http_client::{HttpClient, HttpClientError, TransportErrorKind};

/// A selected proxy, carrying the agent matching the target's scheme.
#[derive(Clone)]
pub struct ProxyHandle {
    index: usize,
    label: String,
    client: Client,
}

impl ProxyHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl std::fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyHandle")
            .field("index", &self.index)
            .field("label", &self.label)
            .finish()
    }
}

/// Configured proxy with its HTTP/HTTPS agent pair.
struct ProxyEntry {
    label: String,
    http: Client,
    https: Client,
}

/// Mutable health for one proxy.
#[derive(Debug, Default, Clone)]
struct ProxyHealth {
    cooldown_until: Option<Instant>,
    consecutive_failures: u32,
}

impl ProxyHealth {
    fn is_available(&self, now: Instant) -> bool {
        self.cooldown_until.is_none_or(|until| until <= now)
    }
}

#[derive(Debug, Default)]
struct PoolState {
    cursor: usize,
    health: Vec<ProxyHealth>,
}

/// Snapshot of one proxy for operator display.
#[derive(Debug, Clone)]
pub struct ProxyStatus {
    pub label: String,
    pub available: bool,
    pub consecutive_failures: u32,
    pub cooldown_remaining: Option<Duration>,
}

pub struct ProxyPool {
    entries: Vec<ProxyEntry>,
    state: Mutex<PoolState>,
    cooldown: Duration,
    rotation: RotationMode,
}

impl ProxyPool {
    /// A pool with no proxies; every selection falls back to direct.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            state: Mutex::new(PoolState::default()),
            cooldown: Duration::from_secs(crate::config::proxy::DEFAULT_PROXY_COOLDOWN_SECS),
            rotation: RotationMode::RoundRobin,
        }
    }

    /// Build agents for every configured proxy.
    pub fn from_settings(
        settings: &ProxySettings,
        user_agent: &str,
        connect_timeout: Duration,
    ) -> Result<Self, HttpClientError> {
        let mut entries = Vec::with_capacity(settings.list.len());
        for descriptor in &settings.list {
            let (http, https) =
                HttpClient::build_proxy_pair(user_agent, connect_timeout, descriptor)?;
            entries.push(ProxyEntry {
                label: descriptor.display_label(),
                http,
                https,
            });
        }

        if !entries.is_empty() {
            tracing::info!(
                "Proxy pool ready with {} proxies ({:?})",
                entries.len(),
                settings.rotation
            );
        }

        let health = vec![ProxyHealth::default(); entries.len()];
        Ok(Self {
            entries,
            state: Mutex::new(PoolState { cursor: 0, health }),
            cooldown: Duration::from_secs(settings.cooldown_secs()),
            rotation: settings.rotation,
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Health state stays consistent even if a holder panicked mid-update.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Select the next healthy proxy for `target_url`.
    ///
    /// Returns `None` when the pool is empty or every proxy is cooling down;
    /// the caller should then connect directly.
    pub fn select_proxy(&self, target_url: &str) -> Option<ProxyHandle> {
        if self.entries.is_empty() {
            return None;
        }

        let now = Instant::now();
        let mut state = self.lock();
        let count = self.entries.len();

        let selected = match self.rotation {
            RotationMode::RoundRobin => (0..count)
                .map(|offset| (state.cursor + offset) % count)
                .find(|&idx| state.health[idx].is_available(now))?,
        };
        state.cursor = (selected + 1) % count;
        drop(state);

        let entry = &self.entries[selected];
        let client = if target_url.starts_with("https://") {
            entry.https.clone()
        } else {
            entry.http.clone()
        };

        Some(ProxyHandle {
            index: selected,
            label: entry.label.clone(),
            client,
        })
    }

    /// Record the outcome of a request made through `handle`.
    ///
    /// `None` means success. Only proxy-attributable failures start a cooldown.
    pub fn report_outcome(&self, handle: &ProxyHandle, error: Option<TransportErrorKind>) {
        let mut state = self.lock();
        let Some(health) = state.health.get_mut(handle.index) else {
            return;
        };

        match error {
            None => {
                if health.consecutive_failures > 0 {
                    tracing::debug!("Proxy {} recovered", handle.label);
                }
                health.consecutive_failures = 0;
                health.cooldown_until = None;
            }
            Some(kind) if kind.is_proxy_attributable() => {
                let until = Instant::now() + self.cooldown;
                health.consecutive_failures = health.consecutive_failures.saturating_add(1);
                health.cooldown_until = Some(match health.cooldown_until {
                    Some(existing) if existing > until => existing,
                    _ => until,
                });
                tracing::warn!(
                    "Proxy {} failed ({}), cooling down for {}s ({} consecutive failures)",
                    handle.label,
                    kind,
                    self.cooldown.as_secs(),
                    health.consecutive_failures
                );
            }
            Some(kind) => {
                tracing::debug!(
                    "Not penalising proxy {} for origin-side failure: {}",
                    handle.label,
                    kind
                );
            }
        }
    }

    /// `(total, available now)`.
    pub fn availability(&self) -> (usize, usize) {
        let now = Instant::now();
        let state = self.lock();
        let available = state.health.iter().filter(|h| h.is_available(now)).count();
        (self.entries.len(), available)
    }

    pub fn statuses(&self) -> Vec<ProxyStatus> {
        let now = Instant::now();
        let state = self.lock();
        self.entries
            .iter()
            .zip(state.health.iter())
            .map(|(entry, health)| ProxyStatus {
                label: entry.label.clone(),
                available: health.is_available(now),
                consecutive_failures: health.consecutive_failures,
                cooldown_remaining: health
                    .cooldown_until
                    .filter(|until| *until > now)
                    .map(|until| until - now),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProxyDescriptor, ProxyKind};
    use std::sync::Arc;

    fn pool(n: usize) -> ProxyPool {
        let settings = ProxySettings {
            rotation: RotationMode::RoundRobin,
            list: (0..n)
                .map(|i| ProxyDescriptor {
                    kind: ProxyKind::Http,
                    host: "127.0.0.1".to_string(),
                    port: 8000 + i as u16,
                    username: None,
                    password: None,
                    label: Some(format!("p{}", i)),
                })
                .collect(),
            cooldown_secs: None,
        };
        ProxyPool::from_settings(&settings, "test", Duration::from_secs(1)).unwrap()
    }

    fn pick(pool: &ProxyPool) -> Option<String> {
        pool.select_proxy("https://n1.kemono.su/data/x")
            .map(|h| h.label().to_string())
    }

    #[test]
    fn test_empty_pool_returns_none() {
        let pool = ProxyPool::empty();
        assert!(pool.select_proxy("https://example.com").is_none());
        assert_eq!(pool.availability(), (0, 0));
    }

    #[tokio::test]
    async fn test_round_robin_fairness() {
        let pool = pool(3);
        let picks: Vec<_> = (0..6).filter_map(|_| pick(&pool)).collect();
        assert_eq!(picks, ["p0", "p1", "p2", "p0", "p1", "p2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_excludes_until_elapsed() {
        let pool = pool(2);
        let first = pool.select_proxy("http://a").unwrap();
        assert_eq!(first.label(), "p0");
        pool.report_outcome(&first, Some(TransportErrorKind::Refused));
        assert_eq!(pool.availability(), (2, 1));

        for _ in 0..4 {
            assert_eq!(pick(&pool).as_deref(), Some("p1"));
        }

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(pick(&pool).as_deref(), Some("p1"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(pool.availability(), (2, 2));
        let mut seen: Vec<_> = (0..2).filter_map(|_| pick(&pool)).collect();
        seen.sort();
        assert_eq!(seen, ["p0", "p1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_cooling_down_returns_none() {
        let pool = pool(2);
        for _ in 0..2 {
            let h = pool.select_proxy("http://a").unwrap();
            pool.report_outcome(&h, Some(TransportErrorKind::TimedOut));
        }
        assert!(pool.select_proxy("http://a").is_none());
        assert_eq!(pool.availability(), (2, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_origin_errors_do_not_penalise() {
        let pool = pool(1);
        let h = pool.select_proxy("http://a").unwrap();
        pool.report_outcome(&h, Some(TransportErrorKind::Status(500)));
        pool.report_outcome(&h, Some(TransportErrorKind::Body));
        assert_eq!(pool.availability(), (1, 1));

        pool.report_outcome(&h, Some(TransportErrorKind::Status(407)));
        assert_eq!(pool.availability(), (1, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_clears_cooldown() {
        let pool = pool(1);
        let h = pool.select_proxy("http://a").unwrap();
        pool.report_outcome(&h, Some(TransportErrorKind::Reset));
        pool.report_outcome(&h, Some(TransportErrorKind::Reset));
        assert_eq!(pool.statuses()[0].consecutive_failures, 2);

        pool.report_outcome(&h, None);
        let status = &pool.statuses()[0];
        assert!(status.available);
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.cooldown_remaining.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_skips_cooling_entry_without_losing_place() {
        let pool = pool(3);
        let p0 = pool.select_proxy("http://a").unwrap();
        let p1 = pool.select_proxy("http://a").unwrap();
        pool.report_outcome(&p0, Some(TransportErrorKind::Refused));
        pool.report_outcome(&p1, Some(TransportErrorKind::Refused));
        // cursor is at p2; p0 and p1 are skipped on wrap
        assert_eq!(pick(&pool).as_deref(), Some("p2"));
        assert_eq!(pick(&pool).as_deref(), Some("p2"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reports_do_not_lose_updates() {
        let pool = Arc::new(pool(1));
        let handle = pool.select_proxy("http://a").unwrap();
        let mut tasks = Vec::new();
        for _ in 0..50 {
            let pool = pool.clone();
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                pool.report_outcome(&handle, Some(TransportErrorKind::Refused));
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(pool.statuses()[0].consecutive_failures, 50);
    }
}
