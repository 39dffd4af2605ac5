//! Status classification against the expected-pairs table, and the
//! deterministic report ordering.

use std::cmp::Ordering;
use std::collections::HashSet;

use anyhow::{Context, Result};
use serde::Deserialize;
use xref_core::{Diagnostic, ReconciledRow};

const EXPECTED_PAIRS_YAML: &str = include_str!("../rules/expected_pairs.yaml");

#[derive(Debug, Clone, Deserialize)]
struct ExpectedPairsFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    pairs: Vec<ExpectedPairRule>,
}

#[derive(Debug, Clone, Deserialize)]
struct ExpectedPairRule {
    primary: String,
    secondary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Expected,
    Mismatch,
}

/// Lower-case, treat `-`/`_` as spaces, collapse whitespace.
pub fn normalize_status(status: &str) -> String {
    status
        .to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
pub struct ExpectedPairs {
    pairs: HashSet<(String, String)>,
}

impl ExpectedPairs {
    /// The table shipped in `rules/expected_pairs.yaml`.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(EXPECTED_PAIRS_YAML).context("parsing rules/expected_pairs.yaml")
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: ExpectedPairsFile = serde_yaml::from_str(text)?;
        Ok(Self {
            pairs: file
                .pairs
                .into_iter()
                .map(|rule| (normalize_status(&rule.primary), normalize_status(&rule.secondary)))
                .collect(),
        })
    }

    pub fn classify(&self, primary_status: &str, secondary_status: &str) -> Classification {
        let key = (normalize_status(primary_status), normalize_status(secondary_status));
        if self.pairs.contains(&key) {
            Classification::Expected
        } else {
            Classification::Mismatch
        }
    }

    pub fn classify_row(&self, row: &ReconciledRow) -> Classification {
        self.classify(&row.primary.status, &row.secondary.status)
    }

    /// Mismatches only, unless `show_all` keeps every row.
    pub fn apply_view(&self, rows: Vec<ReconciledRow>, show_all: bool) -> Vec<ReconciledRow> {
        if show_all {
            return rows;
        }
        rows.into_iter()
            .filter(|row| self.classify_row(row) == Classification::Mismatch)
            .collect()
    }
}

/// Sort key for team-prefixed identifiers: `TEAM-29` orders before `TEAM-289`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct IdentifierKey {
    prefix: String,
    number: Option<u64>,
    raw: String,
}

impl IdentifierKey {
    pub fn new(identifier: &str) -> Self {
        let digits_start = identifier
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i)
            .unwrap_or(identifier.len());
        let (prefix, digits) = identifier.split_at(digits_start);
        match digits.parse::<u64>() {
            Ok(number) => Self {
                prefix: prefix.to_string(),
                number: Some(number),
                raw: identifier.to_string(),
            },
            // No (or oversized) numeric suffix: lexical order within the prefix.
            Err(_) => Self {
                prefix: identifier.to_string(),
                number: None,
                raw: identifier.to_string(),
            },
        }
    }
}

fn compare_rows(a: &ReconciledRow, b: &ReconciledRow) -> Ordering {
    IdentifierKey::new(&a.primary.identifier)
        .cmp(&IdentifierKey::new(&b.primary.identifier))
        .then_with(|| a.repository.cmp(&b.repository))
        .then_with(|| a.secondary.number.cmp(&b.secondary.number))
        .then_with(|| a.secondary.id.cmp(&b.secondary.id))
}

/// Total order independent of the order rows were produced in.
pub fn sort_rows(rows: &mut [ReconciledRow]) {
    rows.sort_by(compare_rows);
}

pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| {
        IdentifierKey::new(&a.primary.identifier)
            .cmp(&IdentifierKey::new(&b.primary.identifier))
            .then_with(|| a.link.repository.cmp(&b.link.repository))
            .then_with(|| a.link.number.cmp(&b.link.number))
            .then_with(|| a.outcome.as_str().cmp(b.outcome.as_str()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use xref_core::{PrimarySummary, ResolvedSecondary};

    fn row(identifier: &str, primary_status: &str, secondary_status: &str) -> ReconciledRow {
        ReconciledRow {
            primary: PrimarySummary {
                identifier: identifier.into(),
                title: "t".into(),
                status: primary_status.into(),
            },
            secondary: ResolvedSecondary {
                id: 1,
                number: 1,
                title: "t".into(),
                status: secondary_status.into(),
                url: "https://github.com/org/x/issues/1".into(),
            },
            repository: "org/x".into(),
        }
    }

    fn ids(rows: &[ReconciledRow]) -> Vec<&str> {
        rows.iter().map(|r| r.primary.identifier.as_str()).collect()
    }

    #[test]
    fn builtin_table_parses() {
        let pairs = ExpectedPairs::builtin().unwrap();
        assert_eq!(pairs.classify("Done", "closed"), Classification::Expected);
        assert_eq!(pairs.classify("In Progress", "OPEN"), Classification::Expected);
        assert_eq!(pairs.classify("in-progress", "open"), Classification::Expected);
        assert_eq!(pairs.classify("Won't Fix", "closed"), Classification::Expected);
        assert_eq!(pairs.classify("Done", "open"), Classification::Mismatch);
        assert_eq!(pairs.classify("Todo", "Closed"), Classification::Mismatch);
    }

    #[test]
    fn default_view_hides_expected_pairs() {
        let pairs = ExpectedPairs::builtin().unwrap();
        let rows = vec![row("TEAM-1", "Done", "Closed"), row("TEAM-2", "Todo", "Closed")];

        let default_view = pairs.apply_view(rows.clone(), false);
        assert_eq!(ids(&default_view), vec!["TEAM-2"]);

        let everything = pairs.apply_view(rows, true);
        assert_eq!(ids(&everything), vec!["TEAM-1", "TEAM-2"]);
    }

    #[test]
    fn custom_table_is_loaded_from_yaml() {
        let pairs = ExpectedPairs::from_yaml(
            "version: 1\npairs:\n  - { primary: Shipped, secondary: Closed }\n",
        )
        .unwrap();
        assert_eq!(pairs.classify("shipped", "closed"), Classification::Expected);
        assert_eq!(pairs.classify("done", "closed"), Classification::Mismatch);
    }

    #[test]
    fn numeric_suffix_sorts_numerically() {
        let mut rows = vec![
            row("TEAM-289", "Todo", "open"),
            row("TEAM-29", "Todo", "open"),
            row("TEAM-3", "Todo", "open"),
        ];
        sort_rows(&mut rows);
        assert_eq!(ids(&rows), vec!["TEAM-3", "TEAM-29", "TEAM-289"]);
    }

    #[test]
    fn prefix_sorts_before_number() {
        let mut rows = vec![
            row("BETA-1", "Todo", "open"),
            row("ALPHA-10", "Todo", "open"),
            row("ALPHA-9", "Todo", "open"),
            row("ALPHA-x", "Todo", "open"),
            row("ALPHA-b", "Todo", "open"),
        ];
        sort_rows(&mut rows);
        assert_eq!(
            ids(&rows),
            vec!["ALPHA-9", "ALPHA-10", "ALPHA-b", "ALPHA-x", "BETA-1"]
        );
    }

    #[test]
    fn sorting_ignores_input_order() {
        let base = vec![
            row("TEAM-100", "Todo", "open"),
            row("TEAM-7", "Todo", "open"),
            row("OPS-12", "Todo", "open"),
            row("TEAM-70", "Todo", "open"),
        ];
        let mut forward = base.clone();
        let mut reversed: Vec<_> = base.into_iter().rev().collect();
        sort_rows(&mut forward);
        sort_rows(&mut reversed);
        assert_eq!(forward, reversed);
        assert_eq!(ids(&forward), vec!["OPS-12", "TEAM-7", "TEAM-70", "TEAM-100"]);
    }

    #[test]
    fn identifier_key_splits_trailing_digits() {
        assert!(IdentifierKey::new("TEAM-29") < IdentifierKey::new("TEAM-289"));
        // Equal numbers fall back to the raw text.
        assert!(IdentifierKey::new("TEAM-007") < IdentifierKey::new("TEAM-7"));
        assert!(IdentifierKey::new("TEAM-99999999999999999999999") > IdentifierKey::new("TEAM-1"));
    }
}
