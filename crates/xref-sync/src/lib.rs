//! Reconciliation engine: pages a primary tracker group, resolves the
//! secondary issues its records link to, and reports status mismatches.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;
use xref_adapters::{
    extract_links, ExtractionMode, GithubAdapter, LinearAdapter, PrimaryTracker, SecondaryTracker,
};
use xref_core::{CandidateLink, Diagnostic, PrimaryRecord, ReconciledRow, ResolveOutcome};

pub mod config;
pub mod dispatcher;
pub mod pager;
pub mod reconcile;
pub mod report;
pub mod resolver;

pub use config::{ConfigError, Credentials, ReconcileConfig, RunContext};
pub use dispatcher::{dispatch, DispatchOptions, DispatchReport, WorkItem, WorkResult};
pub use pager::{collect_group_records, PagerOptions};
pub use reconcile::{normalize_status, sort_diagnostics, sort_rows, Classification, ExpectedPairs};
pub use report::{render_inspection, render_json, render_markdown, render_table, write_report};
pub use resolver::{Resolution, SecondaryResolver};

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Team key, name, or id.
    pub group: String,
    /// Stop after this many primary records.
    pub limit: Option<usize>,
    pub show_all: bool,
    pub mode: ExtractionMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileSummary {
    pub run_id: Uuid,
    pub group: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records_scanned: usize,
    pub records_with_links: usize,
    pub links_attempted: usize,
    pub rows_resolved: usize,
    pub rows_shown: usize,
    pub rate_limit_hits: u64,
    pub diagnostics: usize,
}

/// Sorted rows and diagnostics plus the counts a reporter needs.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub summary: ReconcileSummary,
    pub rows: Vec<ReconciledRow>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectedLink {
    pub link: CandidateLink,
    pub resolution: Resolution,
}

/// One record with every link found in it, resolved in extraction order.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub record: PrimaryRecord,
    pub links: Vec<InspectedLink>,
}

/// Turns records into dispatcher input. Returns the items and how many
/// records contributed at least one link.
pub fn work_items(records: &[PrimaryRecord], mode: ExtractionMode) -> (Vec<WorkItem>, usize) {
    let mut items = Vec::new();
    let mut records_with_links = 0;
    for record in records {
        let links = extract_links(record, mode);
        if links.is_empty() {
            continue;
        }
        records_with_links += 1;
        let primary = record.summary();
        items.extend(links.into_iter().map(|link| WorkItem {
            primary: primary.clone(),
            link,
        }));
    }
    (items, records_with_links)
}

/// Successful resolutions become rows; everything else becomes a diagnostic.
pub fn partition_results(results: Vec<WorkResult>) -> (Vec<ReconciledRow>, Vec<Diagnostic>) {
    let mut rows = Vec::new();
    let mut diagnostics = Vec::new();
    for WorkResult { item, resolution } in results {
        match (resolution.outcome, resolution.details) {
            (ResolveOutcome::Success, Some(secondary)) => rows.push(ReconciledRow {
                primary: item.primary,
                secondary,
                repository: item.link.repository,
            }),
            (outcome, _) => diagnostics.push(Diagnostic {
                primary: item.primary,
                link: item.link,
                outcome,
                attempts: resolution.attempts,
                detail: resolution.detail,
            }),
        }
    }
    (rows, diagnostics)
}

pub struct Reconciler {
    ctx: RunContext,
    primary: Arc<dyn PrimaryTracker>,
    resolver: Arc<SecondaryResolver>,
    expected: ExpectedPairs,
}

impl Reconciler {
    /// Builds the Linear and GitHub clients from the run configuration.
    pub fn from_context(ctx: RunContext) -> Result<Self> {
        let config = &ctx.config;
        let http = config.http_client_config();
        let token = config.credentials.validate()?.to_string();
        let primary = LinearAdapter::new(token, config.linear_api_url.clone(), config.page_size, &http)
            .context("building Linear client")?;
        let secondary = GithubAdapter::new(
            config.credentials.secondary_token.clone(),
            config.github_api_url.clone(),
            &http,
        )
        .context("building GitHub client")?;
        Self::with_trackers(ctx, Arc::new(primary), Arc::new(secondary))
    }

    pub fn with_trackers(
        ctx: RunContext,
        primary: Arc<dyn PrimaryTracker>,
        secondary: Arc<dyn SecondaryTracker>,
    ) -> Result<Self> {
        let resolver = Arc::new(SecondaryResolver::new(secondary, ctx.config.retry));
        Ok(Self {
            ctx,
            primary,
            resolver,
            expected: ExpectedPairs::builtin()?,
        })
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub async fn run(&self, options: &ReconcileOptions) -> Result<ReconcileReport> {
        let span = info_span!("reconcile", run_id = %self.ctx.run_id, group = %options.group);
        self.run_inner(options).instrument(span).await
    }

    async fn run_inner(&self, options: &ReconcileOptions) -> Result<ReconcileReport> {
        let started_at = Utc::now();
        let group = self
            .primary
            .find_group(&options.group)
            .await
            .context("looking up group")?
            .with_context(|| format!("group {:?} not found", options.group))?;
        info!(group = %group.name, key = %group.key, "collecting records");

        let records = collect_group_records(
            self.primary.as_ref(),
            &group.id,
            PagerOptions {
                page_delay: self.ctx.config.page_delay,
                limit: options.limit,
            },
        )
        .await
        .with_context(|| format!("fetching records for {}", group.name))?;

        let (items, records_with_links) = work_items(&records, options.mode);
        let links_attempted = items.len();
        info!(
            records = records.len(),
            records_with_links,
            links = links_attempted,
            workers = self.ctx.workers,
            "resolving links"
        );

        let dispatched = dispatch(
            Arc::clone(&self.resolver),
            items,
            DispatchOptions {
                workers: self.ctx.workers,
                progress_every: self.ctx.config.progress_every,
            },
        )
        .await;

        let (rows, mut diagnostics) = partition_results(dispatched.results);
        let rows_resolved = rows.len();
        let mut rows = self.expected.apply_view(rows, options.show_all);
        sort_rows(&mut rows);
        sort_diagnostics(&mut diagnostics);

        let summary = ReconcileSummary {
            run_id: self.ctx.run_id,
            group: group.name,
            started_at,
            finished_at: Utc::now(),
            records_scanned: records.len(),
            records_with_links,
            links_attempted,
            rows_resolved,
            rows_shown: rows.len(),
            rate_limit_hits: dispatched.rate_limit_hits,
            diagnostics: diagnostics.len(),
        };
        info!(
            rows_resolved,
            rows_shown = summary.rows_shown,
            diagnostics = summary.diagnostics,
            rate_limit_hits = summary.rate_limit_hits,
            "reconciliation complete"
        );

        Ok(ReconcileReport {
            summary,
            rows,
            diagnostics,
        })
    }

    /// Resolves every link in one record, sequentially so the output keeps
    /// extraction order.
    pub async fn inspect_record(&self, identifier: &str) -> Result<Inspection> {
        let record = self
            .primary
            .fetch_record(identifier)
            .await
            .with_context(|| format!("fetching {identifier}"))?
            .with_context(|| format!("record {identifier} not found"))?;

        let mut links = Vec::new();
        for link in extract_links(&record, ExtractionMode::All) {
            let resolution = self.resolver.resolve(&link.repository, link.number).await;
            links.push(InspectedLink { link, resolution });
        }
        Ok(Inspection { record, links })
    }
}
