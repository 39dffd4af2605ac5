//! Fan-out of link resolutions over a bounded worker pool.
//!
//! Results come back in completion order. Every submitted item yields exactly
//! one [`WorkResult`], including items whose worker task died.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use xref_core::{CandidateLink, PrimarySummary, ResolveOutcome};

use crate::resolver::{Resolution, SecondaryResolver};

#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub primary: PrimarySummary,
    pub link: CandidateLink,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkResult {
    pub item: WorkItem,
    pub resolution: Resolution,
}

impl WorkResult {
    pub fn outcome(&self) -> ResolveOutcome {
        self.resolution.outcome
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchOptions {
    pub workers: usize,
    /// Log progress after this many completions; 0 disables it.
    pub progress_every: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub results: Vec<WorkResult>,
    pub rate_limit_hits: u64,
}

pub async fn dispatch(
    resolver: Arc<SecondaryResolver>,
    items: Vec<WorkItem>,
    options: DispatchOptions,
) -> DispatchReport {
    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let mut tasks = JoinSet::new();
    let mut pending: BTreeMap<usize, WorkItem> = BTreeMap::new();

    for (index, item) in items.into_iter().enumerate() {
        let resolver = Arc::clone(&resolver);
        let semaphore = Arc::clone(&semaphore);
        let repository = item.link.repository.clone();
        let number = item.link.number;
        pending.insert(index, item);

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (index, Resolution::aborted("worker pool closed"));
            };
            (index, resolver.resolve(&repository, number).await)
        });
    }

    let mut report = DispatchReport {
        results: Vec::with_capacity(total),
        rate_limit_hits: 0,
    };
    let mut processed = 0usize;
    let mut window_hits = 0u64;

    while let Some(joined) = tasks.join_next().await {
        processed += 1;
        match joined {
            Ok((index, resolution)) => {
                if let Some(item) = pending.remove(&index) {
                    let hits = u64::from(resolution.rate_limit_hits);
                    report.rate_limit_hits += hits;
                    window_hits += hits;
                    report.results.push(WorkResult { item, resolution });
                }
            }
            Err(err) => warn!(%err, "resolution task failed"),
        }

        if options.progress_every > 0
            && (processed % options.progress_every == 0 || processed == total)
        {
            info!(
                processed,
                total,
                rate_limit_hits = window_hits,
                "resolved {processed}/{total} links"
            );
            window_hits = 0;
        }
    }

    // Anything still pending belonged to a task that panicked or was cancelled.
    for (_, item) in pending {
        report.results.push(WorkResult {
            item,
            resolution: Resolution::aborted("worker task did not complete"),
        });
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use xref_adapters::{LookupError, SecondaryTracker};
    use xref_core::{LinkKind, Provenance, ProvenanceSource, ResolvedSecondary};
    use xref_http::RetryPolicy;

    /// Odd numbers resolve, multiples of 10 are missing, the rest fail. Every
    /// call sleeps a pseudo-random amount so completion order is scrambled.
    struct Jittery {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Jittery {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SecondaryTracker for Jittery {
        async fn lookup(&self, _repo: &str, number: u64) -> Result<ResolvedSecondary, LookupError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let jitter = (number.wrapping_mul(7919) % 37) + 1;
            tokio::time::sleep(Duration::from_millis(jitter)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if number % 10 == 0 {
                Err(LookupError::NotFound)
            } else if number % 2 == 1 {
                Ok(ResolvedSecondary {
                    id: number,
                    number,
                    title: format!("issue {number}"),
                    status: "open".into(),
                    url: format!("https://github.com/org/x/issues/{number}"),
                })
            } else {
                Err(LookupError::Transport("boom".into()))
            }
        }
    }

    fn items(n: u64) -> Vec<WorkItem> {
        (1..=n)
            .map(|number| WorkItem {
                primary: PrimarySummary {
                    identifier: format!("TEAM-{number}"),
                    title: "t".into(),
                    status: "Todo".into(),
                },
                link: CandidateLink {
                    repository: "org/x".into(),
                    number,
                    kind: LinkKind::Issue,
                    provenance: Provenance {
                        source: ProvenanceSource::AttachmentUrl,
                        matched: format!("github.com/org/x/issues/{number}"),
                    },
                },
            })
            .collect()
    }

    fn resolver(tracker: Arc<Jittery>) -> Arc<SecondaryResolver> {
        Arc::new(SecondaryResolver::new(
            tracker,
            RetryPolicy {
                max_attempts: 2,
                rate_limit_base: Duration::from_millis(5),
                error_delay: Duration::from_millis(1),
            },
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn yields_exactly_one_result_per_item_for_any_pool_size() {
        for workers in [1, 5, 50] {
            let tracker = Jittery::new();
            let report = dispatch(
                resolver(tracker.clone()),
                items(120),
                DispatchOptions {
                    workers,
                    progress_every: 25,
                },
            )
            .await;

            assert_eq!(report.results.len(), 120, "workers={workers}");
            let numbers: HashSet<u64> = report.results.iter().map(|r| r.item.link.number).collect();
            assert_eq!(numbers.len(), 120);
            assert!(tracker.peak.load(Ordering::SeqCst) <= workers);

            for result in &report.results {
                let n = result.item.link.number;
                assert_eq!(result.item.primary.identifier, format!("TEAM-{n}"));
                let expected = if n % 10 == 0 {
                    ResolveOutcome::NotFound
                } else if n % 2 == 1 {
                    ResolveOutcome::Success
                } else {
                    ResolveOutcome::Error
                };
                assert_eq!(result.outcome(), expected);
                assert_eq!(result.resolution.details.is_some(), expected == ResolveOutcome::Success);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_batch_completes() {
        let report = dispatch(
            resolver(Jittery::new()),
            Vec::new(),
            DispatchOptions {
                workers: 3,
                progress_every: 10,
            },
        )
        .await;
        assert!(report.results.is_empty());
        assert_eq!(report.rate_limit_hits, 0);
    }

    struct Throttled;

    #[async_trait]
    impl SecondaryTracker for Throttled {
        async fn lookup(&self, _repo: &str, _number: u64) -> Result<ResolvedSecondary, LookupError> {
            Err(LookupError::RateLimited)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_hits_sum_across_workers() {
        let resolver = Arc::new(SecondaryResolver::new(
            Arc::new(Throttled),
            RetryPolicy {
                max_attempts: 3,
                rate_limit_base: Duration::from_secs(10),
                error_delay: Duration::from_secs(2),
            },
        ));
        let report = dispatch(
            resolver,
            items(4),
            DispatchOptions {
                workers: 2,
                progress_every: 1,
            },
        )
        .await;

        assert_eq!(report.results.len(), 4);
        assert_eq!(report.rate_limit_hits, 4 * 3);
        assert!(report
            .results
            .iter()
            .all(|r| r.outcome() == ResolveOutcome::RateLimited && r.resolution.rate_limit_hits == 3));
    }

    struct Panicky;

    #[async_trait]
    impl SecondaryTracker for Panicky {
        async fn lookup(&self, _repo: &str, number: u64) -> Result<ResolvedSecondary, LookupError> {
            if number == 2 {
                panic!("lookup blew up");
            }
            Err(LookupError::NotFound)
        }
    }

    #[tokio::test]
    async fn panicking_worker_is_still_accounted_for() {
        let resolver = Arc::new(SecondaryResolver::new(Arc::new(Panicky), RetryPolicy::default()));
        let report = dispatch(
            resolver,
            items(3),
            DispatchOptions {
                workers: 2,
                progress_every: 0,
            },
        )
        .await;

        assert_eq!(report.results.len(), 3);
        let failed = report
            .results
            .iter()
            .find(|r| r.item.link.number == 2)
            .unwrap();
        assert_eq!(failed.outcome(), ResolveOutcome::Error);
        assert!(failed.resolution.details.is_none());
    }
}
