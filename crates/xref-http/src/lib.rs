//! HTTP client construction, retry policy and response classification shared
//! by the tracker adapters.

use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;

pub const CRATE_NAME: &str = "xref";

pub fn default_user_agent() -> String {
    format!("{CRATE_NAME}/{}", env!("CARGO_PKG_VERSION"))
}

/// How a secondary tracker response should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    /// Terminal; never retried.
    NotFound,
    /// Retried with a wait that grows with the attempt index.
    RateLimited,
    /// Retried with the fixed error delay.
    Failed,
}

pub fn classify_status(status: StatusCode) -> ResponseClass {
    if status.is_success() {
        ResponseClass::Success
    } else if status == StatusCode::NOT_FOUND {
        ResponseClass::NotFound
    } else if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        // GitHub answers an exhausted quota with 403 as often as 429.
        ResponseClass::RateLimited
    } else {
        ResponseClass::Failed
    }
}

/// Bounded retry knobs for secondary lookups.
///
/// Attempt indices are zero based. A rate-limited attempt `i` waits
/// `rate_limit_base * (i + 1)` before the next one; any other failure waits
/// `error_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit_base: Duration,
    pub error_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_base: Duration::from_secs(10),
            error_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn rate_limit_delay(&self, attempt_index: u32) -> Duration {
        self.rate_limit_base
            .saturating_mul(attempt_index.saturating_add(1))
    }

    pub fn error_delay(&self) -> Duration {
        self.error_delay
    }

    /// Whether another attempt is allowed after `attempt_index` failed.
    pub fn has_attempt_after(&self, attempt_index: u32) -> bool {
        attempt_index.saturating_add(1) < self.max_attempts.max(1)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
        }
    }
}

pub fn build_client(config: &HttpClientConfig) -> anyhow::Result<reqwest::Client> {
    let user_agent = config
        .user_agent
        .clone()
        .unwrap_or_else(default_user_agent);
    reqwest::Client::builder()
        .gzip(true)
        .timeout(config.timeout)
        .user_agent(user_agent)
        .build()
        .context("building reqwest client")
}
