//! Cursor pagination over a primary tracker group.

use std::time::Duration;

use tracing::info;
use xref_adapters::{PrimaryTracker, TrackerError};
use xref_core::PrimaryRecord;

#[derive(Debug, Clone, Copy, Default)]
pub struct PagerOptions {
    /// Pause between page requests.
    pub page_delay: Duration,
    /// Stop once this many records have been collected.
    pub limit: Option<usize>,
}

/// Follows continuation cursors until the terminal page. Transport failures
/// abort the traversal; restart from an empty cursor to retry.
pub async fn collect_group_records(
    tracker: &dyn PrimaryTracker,
    group_id: &str,
    options: PagerOptions,
) -> Result<Vec<PrimaryRecord>, TrackerError> {
    let mut records = Vec::new();
    let mut cursor: Option<String> = None;
    if options.limit == Some(0) {
        return Ok(records);
    }

    loop {
        let page = tracker.fetch_page(group_id, cursor.as_deref()).await?;
        let fetched = page.records.len();
        records.extend(page.records);
        info!(fetched, total = records.len(), "fetched record page");

        if let Some(limit) = options.limit {
            if records.len() >= limit {
                records.truncate(limit);
                break;
            }
        }

        match page.next_cursor {
            None => break,
            Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                return Err(TrackerError::Decode(format!(
                    "pagination cursor {next:?} did not advance"
                )));
            }
            Some(next) => cursor = Some(next),
        }

        if !options.page_delay.is_zero() {
            tokio::time::sleep(options.page_delay).await;
        }
    }

    Ok(records)
}
