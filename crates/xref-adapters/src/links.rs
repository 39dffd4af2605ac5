//! Secondary tracker references embedded in primary records.
//!
//! Both extraction modes run the same pattern set so bulk reconciliation and
//! single-record inspection never disagree on what counts as a link.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use xref_core::{CandidateLink, LinkKind, PrimaryRecord, Provenance, ProvenanceSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractionMode {
    /// Only the first link found in attachment URLs: the official mirror.
    #[default]
    FirstAttachment,
    /// Every distinct link across attachments, title and body.
    All,
}

struct LinkPattern {
    kind: LinkKind,
    regex: Regex,
}

impl LinkPattern {
    fn new(kind: LinkKind, pattern: &str) -> Self {
        Self {
            kind,
            regex: Regex::new(pattern).expect("static link pattern compiles"),
        }
    }
}

fn patterns() -> &'static [LinkPattern] {
    static PATTERNS: OnceLock<Vec<LinkPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            LinkPattern::new(
                LinkKind::Issue,
                r"github\.com/([A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+)/issues/(\d+)\b",
            ),
            LinkPattern::new(
                LinkKind::PullRequest,
                r"github\.com/([A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+)/pull/(\d+)\b",
            ),
        ]
    })
}

/// All matches in `text`, in position order.
fn scan(text: &str, source: ProvenanceSource) -> Vec<CandidateLink> {
    let mut found: Vec<(usize, CandidateLink)> = Vec::new();
    for pattern in patterns() {
        for caps in pattern.regex.captures_iter(text) {
            let (Some(whole), Some(repo), Some(number)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            // Digits that overflow u64 are not a real issue number.
            let Ok(number) = number.as_str().parse::<u64>() else {
                continue;
            };
            found.push((
                whole.start(),
                CandidateLink {
                    repository: repo.as_str().to_string(),
                    number,
                    kind: pattern.kind,
                    provenance: Provenance {
                        source,
                        matched: whole.as_str().to_string(),
                    },
                },
            ));
        }
    }
    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, link)| link).collect()
}

pub fn extract_links(record: &PrimaryRecord, mode: ExtractionMode) -> Vec<CandidateLink> {
    match mode {
        ExtractionMode::FirstAttachment => first_attachment_link(record).into_iter().collect(),
        ExtractionMode::All => all_links(record),
    }
}

fn first_attachment_link(record: &PrimaryRecord) -> Option<CandidateLink> {
    record
        .attachments
        .iter()
        .find_map(|attachment| scan(&attachment.url, ProvenanceSource::AttachmentUrl).into_iter().next())
}

fn all_links(record: &PrimaryRecord) -> Vec<CandidateLink> {
    let mut sources: Vec<(&str, ProvenanceSource)> = Vec::new();
    for attachment in &record.attachments {
        sources.push((attachment.url.as_str(), ProvenanceSource::AttachmentUrl));
    }
    for attachment in &record.attachments {
        if let Some(title) = attachment.title.as_deref() {
            sources.push((title, ProvenanceSource::AttachmentTitle));
        }
    }
    sources.push((record.title.as_str(), ProvenanceSource::RecordTitle));
    sources.push((record.body.as_str(), ProvenanceSource::Body));

    let mut seen: HashSet<(String, u64)> = HashSet::new();
    let mut links = Vec::new();
    for (text, source) in sources {
        for link in scan(text, source) {
            // First provenance wins; later sightings are dropped, not merged.
            if seen.insert((link.repository.clone(), link.number)) {
                links.push(link);
            }
        }
    }
    links
}
