//! Per-filename outcomes and batch-level progress

use super::candidate::Candidate;
use super::catalog::CandidateIssue;
use crate::error::{ItemError, Stage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Selector confidence in a chosen issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    None,
    Low,
    Medium,
    High,
}

impl MatchConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchConfidence::None => "none",
            MatchConfidence::Low => "low",
            MatchConfidence::Medium => "medium",
            MatchConfidence::High => "high",
        }
    }

    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => MatchConfidence::High,
            "medium" => MatchConfidence::Medium,
            "low" => MatchConfidence::Low,
            _ => MatchConfidence::None,
        }
    }
}

impl std::fmt::Display for MatchConfidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of selection for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub candidate: Candidate,
    pub selected: Option<CandidateIssue>,
    pub confidence: MatchConfidence,
    pub reasoning: String,
    pub catalog_id: Option<u64>,
    pub catalog_url: Option<String>,
    /// Matcher or strategy that produced the selection
    #[serde(default)]
    pub matched_by: Option<String>,
}

impl MatchResult {
    /// No issue chosen
    pub fn none(candidate: &Candidate, reasoning: impl Into<String>) -> Self {
        Self {
            candidate: candidate.clone(),
            selected: None,
            confidence: MatchConfidence::None,
            reasoning: reasoning.into(),
            catalog_id: None,
            catalog_url: None,
            matched_by: None,
        }
    }

    pub fn selected(
        candidate: &Candidate,
        issue: &CandidateIssue,
        confidence: MatchConfidence,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            candidate: candidate.clone(),
            selected: Some(issue.clone()),
            confidence,
            reasoning: reasoning.into(),
            catalog_id: Some(issue.id),
            catalog_url: issue.site_detail_url.clone(),
            matched_by: None,
        }
    }

    pub fn matched_by(mut self, name: impl Into<String>) -> Self {
        self.matched_by = Some(name.into());
        self
    }

    pub fn is_match(&self) -> bool {
        self.selected.is_some()
    }
}

/// Exactly one per input filename per non-cancelled batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub filename: String,
    pub success: bool,
    pub error: Option<String>,
    pub failed_stage: Option<Stage>,
    pub match_result: Option<MatchResult>,
    pub processed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ProcessingResult {
    pub fn succeeded(filename: impl Into<String>, match_result: MatchResult, duration_ms: u64) -> Self {
        Self {
            filename: filename.into(),
            success: true,
            error: None,
            failed_stage: None,
            match_result: Some(match_result),
            processed_at: Utc::now(),
            duration_ms,
        }
    }

    pub fn failed(filename: impl Into<String>, error: &ItemError, duration_ms: u64) -> Self {
        Self {
            filename: filename.into(),
            success: false,
            error: Some(error.to_string()),
            failed_stage: Some(error.stage()),
            match_result: None,
            processed_at: Utc::now(),
            duration_ms,
        }
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        self.match_result.as_ref().map(|m| &m.candidate)
    }
}

/// Parse-only outcome for one filename
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedItem {
    pub filename: String,
    pub parser: String,
    pub candidate: Option<Candidate>,
    pub error: Option<String>,
}

/// Snapshot of batch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
}

impl BatchProgress {
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed)
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f64 * 100.0 / self.total as f64
        }
    }
}

/// Lifecycle of one filename inside a batch
///
/// `Pending → Parsed → Searched → Matched → Done`, or
/// `Pending → Failed(stage) → Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemState {
    Pending,
    Parsed,
    Searched,
    Matched,
    Failed(Stage),
    Done,
}

impl ItemState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_advance_to(&self, next: ItemState) -> bool {
        use ItemState::*;
        matches!(
            (self, next),
            (Pending, Parsed)
                | (Parsed, Searched)
                | (Searched, Matched)
                | (Matched, Done)
                | (Failed(_), Done)
                | (Pending, Failed(Stage::Parse))
                | (Parsed, Failed(Stage::Search))
                | (Searched, Failed(Stage::Match))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;

    #[test]
    fn test_item_state_transitions() {
        use ItemState::*;
        assert!(Pending.can_advance_to(Parsed));
        assert!(Searched.can_advance_to(Matched));
        assert!(Parsed.can_advance_to(Failed(Stage::Search)));
        assert!(Failed(Stage::Parse).can_advance_to(Done));

        assert!(!Pending.can_advance_to(Matched));
        assert!(!Done.can_advance_to(Pending));
        assert!(!Pending.can_advance_to(Failed(Stage::Match)));
    }

    #[test]
    fn test_failed_result_records_stage() {
        let err = ItemError::from(ParseError::EmptyFilename);
        let result = ProcessingResult::failed("", &err, 3);

        assert!(!result.success);
        assert_eq!(result.failed_stage, Some(Stage::Parse));
        assert!(result.error.as_deref().unwrap().starts_with("parsing filename"));
        assert!(result.match_result.is_none());
    }

    #[test]
    fn test_progress_math() {
        let progress = BatchProgress { total: 4, processed: 1, successful: 1, failed: 0 };
        assert_eq!(progress.remaining(), 3);
        assert_eq!(progress.percent(), 25.0);
        assert_eq!(BatchProgress::default().percent(), 100.0);
    }

    #[test]
    fn test_match_confidence_labels() {
        assert_eq!(MatchConfidence::from_label("HIGH"), MatchConfidence::High);
        assert_eq!(MatchConfidence::from_label("unsure"), MatchConfidence::None);
        assert_eq!(
            serde_json::to_string(&MatchConfidence::Medium).unwrap(),
            "\"medium\""
        );
    }
}
