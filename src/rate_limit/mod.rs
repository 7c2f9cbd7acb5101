//! Backoff helpers for rate-limited and flaky origins.
//!
//! The origin answers bursts with HTTP 429; callers combine these helpers
//! with their own attempt counters:
//! - capped exponential backoff for 429 responses
//! - linear backoff for other retryable failures
//! - `Retry-After` parsing so the server can shorten or lengthen the wait

use std::time::Duration;

/// Parse a `Retry-After` header value (delta-seconds form only).
/// Returns `None` if the header is missing or not a plain integer.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    let value = header_value?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Exponential backoff for a zero-based attempt: `base * 2^attempt`, capped.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(16));
    base.saturating_mul(factor).min(cap)
}

/// Linear backoff for a one-based attempt: `step * attempt`.
pub fn linear_delay(attempt: u32, step: Duration) -> Duration {
    step.saturating_mul(attempt.max(1))
}

/// Delay to wait after a 429: the server's `Retry-After` if given, otherwise
/// exponential backoff. Both are clamped to `cap`.
pub fn rate_limit_delay(
    attempt: u32,
    retry_after: Option<&str>,
    base: Duration,
    cap: Duration,
) -> Duration {
    match parse_retry_after(retry_after) {
        Some(wait) => wait.min(cap),
        None => backoff_delay(attempt, base, cap),
    }
}

/// Check if a status code is a definite rate limit signal.
pub fn is_rate_limit_status(status_code: u16) -> bool {
    status_code == 429
}
