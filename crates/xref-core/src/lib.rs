//! Core domain model for cross-referencing primary tracker records against
//! their mirrored secondary tracker issues.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Person attached to a primary record (assignee or creator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub title: Option<String>,
}

/// A record fetched from the primary tracker. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryRecord {
    pub id: String,
    /// Team-prefixed human identifier, e.g. `TEAM-123`.
    pub identifier: String,
    pub title: String,
    pub status: String,
    pub body: String,
    pub attachments: Vec<Attachment>,
    pub labels: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub assignee: Option<Person>,
    pub creator: Option<Person>,
}

impl PrimaryRecord {
    pub fn summary(&self) -> PrimarySummary {
        PrimarySummary {
            identifier: self.identifier.clone(),
            title: self.title.clone(),
            status: self.status.clone(),
        }
    }
}

/// The slice of a primary record carried through resolution and reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimarySummary {
    pub identifier: String,
    pub title: String,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Issue,
    PullRequest,
}

/// Where in a primary record a reference was found, in scan priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceSource {
    AttachmentUrl,
    AttachmentTitle,
    RecordTitle,
    Body,
}

impl fmt::Display for ProvenanceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::AttachmentUrl => "attachment url",
            Self::AttachmentTitle => "attachment title",
            Self::RecordTitle => "title",
            Self::Body => "description",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: ProvenanceSource,
    /// Literal substring the pattern matched.
    pub matched: String,
}

/// Unresolved reference to a secondary tracker issue.
///
/// Identity for deduplication is `(repository, number)`; provenance is kept
/// for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateLink {
    /// `owner/repo`.
    pub repository: String,
    pub number: u64,
    pub kind: LinkKind,
    pub provenance: Provenance,
}

impl CandidateLink {
    pub fn key(&self) -> (&str, u64) {
        (self.repository.as_str(), self.number)
    }
}

impl fmt::Display for CandidateLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repository, self.number)
    }
}

/// Current state of a secondary tracker issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedSecondary {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub status: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveOutcome {
    Success,
    NotFound,
    RateLimited,
    Error,
}

impl ResolveOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ResolveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit consumed by the output layer. Only built from a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledRow {
    pub primary: PrimarySummary,
    pub secondary: ResolvedSecondary,
    pub repository: String,
}

/// A link that did not resolve, kept for the diagnostics section of a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub primary: PrimarySummary,
    pub link: CandidateLink,
    pub outcome: ResolveOutcome,
    pub attempts: u32,
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_serializes_as_snake_case() {
        let json = serde_json::to_string(&ResolveOutcome::RateLimited).unwrap();
        assert_eq!(json, "\"rate_limited\"");
        assert_eq!(ResolveOutcome::NotFound.to_string(), "not_found");
    }

    #[test]
    fn provenance_sources_order_by_scan_priority() {
        let mut sources = vec![
            ProvenanceSource::Body,
            ProvenanceSource::RecordTitle,
            ProvenanceSource::AttachmentTitle,
            ProvenanceSource::AttachmentUrl,
        ];
        sources.sort();
        assert_eq!(
            sources,
            vec![
                ProvenanceSource::AttachmentUrl,
                ProvenanceSource::AttachmentTitle,
                ProvenanceSource::RecordTitle,
                ProvenanceSource::Body,
            ]
        );
    }

    #[test]
    fn candidate_link_displays_as_repo_hash_number() {
        let link = CandidateLink {
            repository: "org/x".into(),
            number: 5,
            kind: LinkKind::Issue,
            provenance: Provenance {
                source: ProvenanceSource::AttachmentUrl,
                matched: "github.com/org/x/issues/5".into(),
            },
        };
        assert_eq!(link.to_string(), "org/x#5");
        assert_eq!(link.key(), ("org/x", 5));
    }
}
