//! Bounded-retry resolution of one candidate link against the secondary tracker.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info_span, warn, Instrument};
use xref_adapters::{LookupError, SecondaryTracker};
use xref_core::{ResolveOutcome, ResolvedSecondary};
use xref_http::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub details: Option<ResolvedSecondary>,
    pub outcome: ResolveOutcome,
    pub attempts: u32,
    pub rate_limit_hits: u32,
    /// Waits taken between attempts, in order.
    pub waits: Vec<Duration>,
    pub detail: Option<String>,
}

impl Resolution {
    pub(crate) fn aborted(detail: impl Into<String>) -> Self {
        Self {
            details: None,
            outcome: ResolveOutcome::Error,
            attempts: 0,
            rate_limit_hits: 0,
            waits: Vec::new(),
            detail: Some(detail.into()),
        }
    }
}

/// Holds only read-only state, so one instance is shared by every worker.
pub struct SecondaryResolver {
    tracker: Arc<dyn SecondaryTracker>,
    policy: RetryPolicy,
}

impl SecondaryResolver {
    pub fn new(tracker: Arc<dyn SecondaryTracker>, policy: RetryPolicy) -> Self {
        Self { tracker, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn resolve(&self, repository: &str, number: u64) -> Resolution {
        let span = info_span!("resolve", repository, number);
        self.resolve_inner(repository, number).instrument(span).await
    }

    async fn resolve_inner(&self, repository: &str, number: u64) -> Resolution {
        let mut waits = Vec::new();
        let mut rate_limit_hits = 0u32;
        let mut attempt = 0u32;

        let (details, outcome, detail) = loop {
            let wait = match self.tracker.lookup(repository, number).await {
                Ok(details) => break (Some(details), ResolveOutcome::Success, None),
                Err(LookupError::NotFound) => {
                    debug!("secondary issue not found");
                    break (None, ResolveOutcome::NotFound, None);
                }
                Err(LookupError::RateLimited) => {
                    rate_limit_hits += 1;
                    if !self.policy.has_attempt_after(attempt) {
                        warn!(attempts = attempt + 1, "giving up after repeated rate limiting");
                        break (
                            None,
                            ResolveOutcome::RateLimited,
                            Some("rate limited".to_string()),
                        );
                    }
                    let wait = self.policy.rate_limit_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        wait_secs = wait.as_secs_f64(),
                        "rate limited, backing off"
                    );
                    wait
                }
                Err(LookupError::Transport(message)) => {
                    if !self.policy.has_attempt_after(attempt) {
                        warn!(attempts = attempt + 1, error = %message, "lookup failed");
                        break (None, ResolveOutcome::Error, Some(message));
                    }
                    debug!(attempt = attempt + 1, error = %message, "lookup failed, retrying");
                    self.policy.error_delay()
                }
            };

            tokio::time::sleep(wait).await;
            waits.push(wait);
            attempt += 1;
        };

        Resolution {
            details,
            outcome,
            attempts: attempt + 1,
            rate_limit_hits,
            waits,
            detail,
        }
    }
}
