//! Automated selection through an ordered matcher chain

use super::matchers::{ExactNameMatcher, MatchQuery, Matcher, SimilarityMatcher};
use super::{Selector, NO_CANDIDATES};
use crate::error::MatchError;
use crate::models::{Candidate, CandidateIssue, MatchResult};

/// Ordered, first-match list of matchers
pub struct MatcherChain {
    matchers: Vec<Box<dyn Matcher>>,
}

impl Default for MatcherChain {
    /// Exact name match, then Jaro-Winkler similarity at 0.85
    fn default() -> Self {
        Self::empty()
            .with_matcher(ExactNameMatcher)
            .with_matcher(SimilarityMatcher::default())
    }
}

impl MatcherChain {
    pub fn empty() -> Self {
        Self {
            matchers: Vec::new(),
        }
    }

    pub fn with_matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.add_matcher(Box::new(matcher));
        self
    }

    pub fn add_matcher(&mut self, matcher: Box<dyn Matcher>) {
        self.matchers.push(matcher);
    }

    pub fn names(&self) -> Vec<String> {
        self.matchers.iter().map(|m| m.name()).collect()
    }

    /// First matcher that names an index wins. An empty list consults no matcher.
    pub fn find_best_match(&self, candidate: &Candidate, issues: &[CandidateIssue]) -> MatchResult {
        if issues.is_empty() {
            return MatchResult::none(candidate, NO_CANDIDATES);
        }

        let query = MatchQuery::from_candidate(candidate);
        for matcher in &self.matchers {
            let Some(idx) = matcher.find(issues, &query) else {
                continue;
            };
            let Some(issue) = issues.get(idx) else {
                tracing::warn!(matcher = %matcher.name(), idx, "Matcher returned out-of-range index, ignoring");
                continue;
            };

            let name = matcher.name();
            return MatchResult::selected(
                candidate,
                issue,
                matcher.confidence(),
                format!("{} selected {}", name, issue.display_line()),
            )
            .matched_by(name);
        }

        MatchResult::none(
            candidate,
            format!("no matcher accepted any of {} candidates", issues.len()),
        )
    }
}

/// [`Selector`] over a [`MatcherChain`]
#[derive(Default)]
pub struct AutoSelector {
    chain: MatcherChain,
}

impl AutoSelector {
    pub fn new(chain: MatcherChain) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &MatcherChain {
        &self.chain
    }
}

#[async_trait::async_trait]
impl Selector for AutoSelector {
    fn name(&self) -> &str {
        "auto"
    }

    async fn select(
        &self,
        candidate: &Candidate,
        issues: &[CandidateIssue],
    ) -> Result<MatchResult, MatchError> {
        let result = self.chain.find_best_match(candidate, issues);
        tracing::debug!(
            filename = %candidate.original_filename,
            confidence = %result.confidence,
            matched_by = ?result.matched_by,
            "Automated selection complete"
        );
        Ok(result)
    }
}
