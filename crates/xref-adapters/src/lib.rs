//! Tracker transport contracts, the Linear and GitHub implementations, and
//! link extraction from primary records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use xref_core::{PrimaryRecord, ResolvedSecondary};

pub mod github;
pub mod linear;
pub mod links;

pub use github::GithubAdapter;
pub use linear::LinearAdapter;
pub use links::{extract_links, ExtractionMode};

/// Failure talking to the primary tracker. Always fatal to the caller.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("graphql error: {0}")]
    GraphQl(String),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("invalid record identifier {0:?}, expected TEAM-123")]
    InvalidIdentifier(String),
}

/// Signal from a single secondary lookup attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("not found")]
    NotFound,
    #[error("rate limited")]
    RateLimited,
    #[error("{0}")]
    Transport(String),
}

/// A primary tracker group (a Linear team).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordPage {
    pub records: Vec<PrimaryRecord>,
    /// `None` marks the terminal page.
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait PrimaryTracker: Send + Sync {
    async fn find_group(&self, identifier: &str) -> Result<Option<Group>, TrackerError>;

    async fn fetch_page(
        &self,
        group_id: &str,
        cursor: Option<&str>,
    ) -> Result<RecordPage, TrackerError>;

    async fn fetch_record(&self, identifier: &str) -> Result<Option<PrimaryRecord>, TrackerError>;
}

/// One lookup attempt against the secondary tracker. Retries live in the caller.
#[async_trait]
pub trait SecondaryTracker: Send + Sync {
    async fn lookup(&self, repository: &str, number: u64)
        -> Result<ResolvedSecondary, LookupError>;
}

/// Split `TEAM-123` into its team key and number.
pub fn split_identifier(identifier: &str) -> Result<(&str, u64), TrackerError> {
    let invalid = || TrackerError::InvalidIdentifier(identifier.to_string());
    let (key, number) = identifier.trim().rsplit_once('-').ok_or_else(invalid)?;
    if key.is_empty() {
        return Err(invalid());
    }
    let number = number.parse::<u64>().map_err(|_| invalid())?;
    Ok((key, number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_team_prefixed_identifiers() {
        assert_eq!(split_identifier("MOCO-1233").unwrap(), ("MOCO", 1233));
        assert_eq!(split_identifier("A-B-7").unwrap(), ("A-B", 7));
    }

    #[test]
    fn rejects_identifiers_without_numeric_suffix() {
        for bad in ["MOCO", "MOCO-", "-12", "MOCO-x1"] {
            assert!(
                matches!(split_identifier(bad), Err(TrackerError::InvalidIdentifier(_))),
                "{bad} should be rejected"
            );
        }
    }
}
