//! Matchers for the automated selection chain
//!
//! A matcher inspects the whole candidate list and either names one index
//! or declines. Matchers are pure and synchronous.

use crate::models::{normalize_issue_number, Candidate, CandidateIssue, MatchConfidence};

/// What the chain is looking for, derived once per candidate
#[derive(Debug, Clone)]
pub struct MatchQuery {
    /// Lowercased series with collapsed whitespace
    pub series: String,
    /// Normalized issue number
    pub issue: Option<String>,
    pub year: Option<String>,
}

impl MatchQuery {
    pub fn from_candidate(candidate: &Candidate) -> Self {
        let issue = if candidate.issue_number.trim().is_empty() {
            None
        } else {
            Some(candidate.normalized_issue())
        };
        Self {
            series: normalize_title(&candidate.series),
            issue,
            year: candidate.year.clone(),
        }
    }

    /// Issue numbers agree after normalization, or one side is unknown
    pub fn issue_compatible(&self, issue: &CandidateIssue) -> bool {
        match &self.issue {
            None => true,
            Some(_) if issue.issue_number.trim().is_empty() => true,
            Some(wanted) => normalize_issue_number(&issue.issue_number) == *wanted,
        }
    }

    pub fn year_matches(&self, issue: &CandidateIssue) -> bool {
        match (&self.year, issue.cover_year()) {
            (Some(wanted), Some(year)) => wanted == year,
            _ => false,
        }
    }
}

/// Lowercase, trim, collapse internal whitespace
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Looser form for similarity scoring: punctuation dropped, leading "the" removed
fn fold_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let normalized = normalize_title(&cleaned);
    normalized
        .strip_prefix("the ")
        .map(str::to_string)
        .unwrap_or(normalized)
}

pub trait Matcher: Send + Sync {
    /// Recorded in `MatchResult::matched_by`
    fn name(&self) -> String;

    /// Confidence attached to a selection made by this matcher
    fn confidence(&self) -> MatchConfidence;

    /// Index of the chosen issue, or `None` to defer to the next matcher
    fn find(&self, issues: &[CandidateIssue], query: &MatchQuery) -> Option<usize>;
}

/// Case-insensitive equality of the series with the volume name (or the
/// issue's own name). Among several hits, one whose cover year equals the
/// candidate's year wins; otherwise the first.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactNameMatcher;

impl Matcher for ExactNameMatcher {
    fn name(&self) -> String {
        "ExactNameMatcher".to_string()
    }

    fn confidence(&self) -> MatchConfidence {
        MatchConfidence::High
    }

    fn find(&self, issues: &[CandidateIssue], query: &MatchQuery) -> Option<usize> {
        let hits: Vec<usize> = issues
            .iter()
            .enumerate()
            .filter(|(_, issue)| {
                (normalize_title(&issue.volume.name) == query.series
                    || normalize_title(&issue.name) == query.series)
                    && query.issue_compatible(issue)
            })
            .map(|(idx, _)| idx)
            .collect();

        hits.iter()
            .copied()
            .find(|&idx| query.year_matches(&issues[idx]))
            .or_else(|| hits.first().copied())
    }
}

/// Jaro-Winkler similarity between series and volume name
#[derive(Debug, Clone, Copy)]
pub struct SimilarityMatcher {
    threshold: f64,
}

impl Default for SimilarityMatcher {
    fn default() -> Self {
        Self { threshold: 0.85 }
    }
}

impl SimilarityMatcher {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn score(a: &str, b: &str) -> f64 {
        strsim::jaro_winkler(&fold_title(a), &fold_title(b))
    }
}

impl Matcher for SimilarityMatcher {
    fn name(&self) -> String {
        format!("SimilarityMatcher({:.2})", self.threshold)
    }

    fn confidence(&self) -> MatchConfidence {
        MatchConfidence::Medium
    }

    fn find(&self, issues: &[CandidateIssue], query: &MatchQuery) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;

        for (idx, issue) in issues.iter().enumerate() {
            if !query.issue_compatible(issue) {
                continue;
            }
            let mut score = Self::score(&query.series, &issue.volume.name);
            // Year agreement breaks near-ties between same-named volumes
            if query.year_matches(issue) {
                score += 0.001;
            }
            if score >= self.threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((idx, score));
            }
        }

        best.map(|(idx, _)| idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue(id: u64, volume: &str, number: &str, cover: &str) -> CandidateIssue {
        CandidateIssue::from_payload(json!({
            "id": id,
            "issue_number": number,
            "cover_date": cover,
            "volume": {"id": id * 10, "name": volume}
        }))
        .unwrap()
    }

    fn query(series: &str, issue: &str, year: Option<&str>) -> MatchQuery {
        let mut candidate = Candidate::new("f.cbz", series, issue);
        if let Some(y) = year {
            candidate = candidate.with_year(y);
        }
        MatchQuery::from_candidate(&candidate)
    }

    #[test]
    fn test_exact_is_case_insensitive_and_checks_issue() {
        let issues = vec![
            issue(1, "Batman", "2", "2016-09-01"),
            issue(2, "BATMAN", "1", "2016-08-01"),
        ];
        let found = ExactNameMatcher.find(&issues, &query("batman", "001", None));
        assert_eq!(found, Some(1));
    }

    #[test]
    fn test_exact_prefers_matching_year() {
        let issues = vec![
            issue(1, "Batman", "1", "1940-04-01"),
            issue(2, "Batman", "1", "2016-08-01"),
        ];
        assert_eq!(ExactNameMatcher.find(&issues, &query("Batman", "1", Some("2016"))), Some(1));
        assert_eq!(ExactNameMatcher.find(&issues, &query("Batman", "1", None)), Some(0));
    }

    #[test]
    fn test_exact_declines_different_names() {
        let issues = vec![issue(1, "Batman Beyond", "1", "1999-03-01")];
        assert_eq!(ExactNameMatcher.find(&issues, &query("Batman", "1", None)), None);
    }

    #[test]
    fn test_similarity_accepts_near_names() {
        let issues = vec![
            issue(1, "Superman", "3", "2025-03-01"),
            issue(2, "The Absolute Superman", "3", "2025-03-01"),
        ];
        let matcher = SimilarityMatcher::default();
        assert_eq!(matcher.find(&issues, &query("Absolute Superman", "003", None)), Some(1));
    }

    #[test]
    fn test_similarity_respects_threshold_and_issue() {
        let issues = vec![issue(1, "Wonder Woman", "3", "2025-03-01")];
        let matcher = SimilarityMatcher::new(0.95);
        assert_eq!(matcher.find(&issues, &query("Absolute Superman", "3", None)), None);

        let issues = vec![issue(1, "Absolute Superman", "4", "2025-04-01")];
        assert_eq!(
            SimilarityMatcher::default().find(&issues, &query("Absolute Superman", "3", None)),
            None
        );
    }

    #[test]
    fn test_unknown_issue_number_is_compatible() {
        let q = query("Maus", "", None);
        assert!(q.issue.is_none());
        assert!(q.issue_compatible(&issue(1, "Maus", "7", "1991-01-01")));
        assert!(query("Maus", "1", None).issue_compatible(&issue(1, "Maus", "", "")));
    }

    #[test]
    fn test_names() {
        assert_eq!(ExactNameMatcher.name(), "ExactNameMatcher");
        assert_eq!(SimilarityMatcher::new(0.5).name(), "SimilarityMatcher(0.50)");
    }

    #[test]
    fn test_fold_title() {
        assert_eq!(fold_title("The  Amazing Spider-Man!"), "amazing spider man");
    }
}
