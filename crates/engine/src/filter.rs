//! Record Filter - which input rows are trackable comments
//!
//! A row is kept when its comment text is non-empty after trimming and is not
//! a workflow status marker ("Closed", "Open", ...). The decision is a plain
//! predicate over the text so new status tokens can be added through
//! configuration without touching the input parser.
//!
//! Key invariants:
//! - The filter is stable: surviving records keep their relative order
//! - Records are returned untouched (no trimming of page or text)
//! - Filtering an already filtered sequence removes nothing

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::record::InputRecord;

/// Status values that mark a lifecycle event rather than a comment.
pub const DEFAULT_STATUS_TOKENS: [&str; 4] = ["closed", "close", "open", "opened"];

// =============================================================================
// StatusTokens
// =============================================================================

/// Closed set of status tokens, compared trimmed and case-folded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct StatusTokens {
    tokens: BTreeSet<String>,
}

impl Default for StatusTokens {
    fn default() -> Self {
        Self::from_iter(DEFAULT_STATUS_TOKENS)
    }
}

impl StatusTokens {
    /// An empty token set: only blank comments are excluded.
    pub fn empty() -> Self {
        Self {
            tokens: BTreeSet::new(),
        }
    }

    /// Default tokens plus `extra`.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tokens = Self::default();
        tokens.extend(extra);
        tokens
    }

    /// Add tokens; blank entries are ignored.
    pub fn extend<I, S>(&mut self, extra: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for token in extra {
            let normalized = normalize(token.as_ref());
            if !normalized.is_empty() {
                self.tokens.insert(normalized);
            }
        }
    }

    /// True if `text` (trimmed, case-folded) is one of the tokens.
    pub fn contains(&self, text: &str) -> bool {
        self.tokens.contains(&normalize(text))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for StatusTokens {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tokens = Self::empty();
        tokens.extend(iter);
        tokens
    }
}

impl From<Vec<String>> for StatusTokens {
    fn from(tokens: Vec<String>) -> Self {
        tokens.into_iter().collect()
    }
}

impl From<StatusTokens> for Vec<String> {
    fn from(tokens: StatusTokens) -> Self {
        tokens.tokens.into_iter().collect()
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

// =============================================================================
// Predicate and filter
// =============================================================================

/// Business rule: does this comment text represent real, trackable content?
pub fn is_trackable(text: &str, tokens: &StatusTokens) -> bool {
    !text.trim().is_empty() && !tokens.contains(text)
}

/// Stable filter over input records.
pub fn filter_records(records: Vec<InputRecord>, tokens: &StatusTokens) -> Vec<InputRecord> {
    let total = records.len();
    let kept: Vec<InputRecord> = records
        .into_iter()
        .filter(|record| is_trackable(&record.text, tokens))
        .collect();

    log::debug!("record filter kept {} of {} rows", kept.len(), total);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tokens_are_the_four_statuses() {
        let tokens = StatusTokens::default();
        assert_eq!(tokens.len(), 4);
        let listed: Vec<&str> = tokens.iter().collect();
        assert_eq!(listed, vec!["close", "closed", "open", "opened"]);
    }

    #[test]
    fn status_match_ignores_case_and_surrounding_space() {
        let tokens = StatusTokens::default();
        assert!(tokens.contains("Closed"));
        assert!(tokens.contains("  OPEN "));
        assert!(tokens.contains("opened\t"));
        assert!(!tokens.contains("Closed - fixed in rev B"));
        assert!(!tokens.contains("reopen"));
    }

    #[test]
    fn blank_and_status_text_is_not_trackable() {
        let tokens = StatusTokens::default();
        assert!(!is_trackable("", &tokens));
        assert!(!is_trackable("   ", &tokens));
        assert!(!is_trackable("Close", &tokens));
        assert!(is_trackable("Needs fix", &tokens));
        assert!(is_trackable("  Open question about scope  ", &tokens));
    }

    #[test]
    fn extra_tokens_extend_the_defaults() {
        let tokens = StatusTokens::with_extra(["Resolved", "  ", "N/A "]);
        assert_eq!(tokens.len(), 6);
        assert!(tokens.contains("resolved"));
        assert!(tokens.contains("n/a"));
        assert!(tokens.contains("closed"));
    }

    #[test]
    fn empty_token_set_only_drops_blank_text() {
        let tokens = StatusTokens::empty();
        assert!(is_trackable("Closed", &tokens));
        assert!(!is_trackable(" ", &tokens));
    }

    #[test]
    fn filter_is_stable_and_leaves_records_untouched() {
        let records = vec![
            InputRecord::new("p1", "Needs fix"),
            InputRecord::new("p2", "Closed"),
            InputRecord::new("p3", " "),
            InputRecord::new("", "  spacing kept  "),
            InputRecord::new("p5", "OPENED"),
            InputRecord::new("p6", "Second comment"),
        ];

        let kept = filter_records(records, &StatusTokens::default());
        assert_eq!(
            kept,
            vec![
                InputRecord::new("p1", "Needs fix"),
                InputRecord::new("", "  spacing kept  "),
                InputRecord::new("p6", "Second comment"),
            ]
        );
    }

    #[test]
    fn tokens_serialize_as_a_plain_list() {
        let tokens = StatusTokens::from_iter(["Closed", "Done"]);
        let json = serde_json::to_string(&tokens).unwrap();
        assert_eq!(json, r#"["closed","done"]"#);

        let back: StatusTokens = serde_json::from_str(r#"["WONTFIX"]"#).unwrap();
        assert!(back.contains("wontfix"));
        assert_eq!(back.len(), 1);
    }
}
