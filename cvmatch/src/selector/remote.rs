//! Completion-backed disambiguation

use super::{Selector, NO_CANDIDATES};
use crate::error::MatchError;
use crate::models::{Candidate, CandidateIssue, MatchConfidence, MatchResult};
use crate::prompts::{result_match_prompt, MatchResponse};
use crate::services::{extract_json, Completion};
use std::sync::Arc;

/// Lets the completion service pick among the catalog results.
///
/// An index outside the list (including `-1`) is treated as no selection.
pub struct RemoteSelector {
    completion: Arc<dyn Completion>,
}

impl RemoteSelector {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self { completion }
    }
}

#[async_trait::async_trait]
impl Selector for RemoteSelector {
    fn name(&self) -> &str {
        "remote"
    }

    async fn select(
        &self,
        candidate: &Candidate,
        issues: &[CandidateIssue],
    ) -> Result<MatchResult, MatchError> {
        if issues.is_empty() {
            return Ok(MatchResult::none(candidate, NO_CANDIDATES));
        }

        let response = self
            .completion
            .complete(&result_match_prompt(candidate, issues))
            .await?;

        let answer: MatchResponse = serde_json::from_str(extract_json(&response))
            .map_err(|e| MatchError::InvalidResponse(e.to_string()))?;

        let reasoning = if answer.reasoning.trim().is_empty() {
            "remote selector gave no reasoning".to_string()
        } else {
            answer.reasoning.trim().to_string()
        };

        let chosen = usize::try_from(answer.selected_index)
            .ok()
            .and_then(|idx| issues.get(idx));

        let result = match chosen {
            Some(issue) => {
                let confidence = match MatchConfidence::from_label(&answer.match_confidence) {
                    // A pick without a stated confidence still counts as a pick
                    MatchConfidence::None => MatchConfidence::Low,
                    c => c,
                };
                MatchResult::selected(candidate, issue, confidence, reasoning).matched_by("remote")
            }
            None => {
                if answer.selected_index >= 0 {
                    tracing::warn!(
                        filename = %candidate.original_filename,
                        index = answer.selected_index,
                        results = issues.len(),
                        "Remote selector index out of range"
                    );
                }
                MatchResult::none(candidate, reasoning)
            }
        };

        tracing::debug!(
            filename = %candidate.original_filename,
            catalog_id = ?result.catalog_id,
            confidence = %result.confidence,
            "Remote selection complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompletionError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Canned {
        answer: String,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Completion for Canned {
        async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    fn canned(answer: &str) -> Arc<Canned> {
        Arc::new(Canned {
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    fn issues() -> Vec<CandidateIssue> {
        vec![
            CandidateIssue::from_payload(json!({"id": 1, "issue_number": "1", "volume": {"id": 9, "name": "Batman"}})).unwrap(),
            CandidateIssue::from_payload(json!({"id": 2, "issue_number": "1", "volume": {"id": 8, "name": "Batman"}})).unwrap(),
        ]
    }

    fn candidate() -> Candidate {
        Candidate::new("Batman 001 (2016).cbz", "Batman", "001").with_year("2016")
    }

    #[tokio::test]
    async fn test_selects_reported_index() {
        let completion = canned(
            "Here you go:\n```json\n{\"selected_index\": 1, \"match_confidence\": \"medium\", \"reasoning\": \"dates fit {2016}\"}\n```",
        );
        let result = RemoteSelector::new(completion)
            .select(&candidate(), &issues())
            .await
            .unwrap();

        assert_eq!(result.catalog_id, Some(2));
        assert_eq!(result.confidence, MatchConfidence::Medium);
        assert_eq!(result.reasoning, "dates fit {2016}");
        assert_eq!(result.matched_by.as_deref(), Some("remote"));
    }

    #[tokio::test]
    async fn test_negative_and_out_of_range_mean_no_selection() {
        for answer in [
            r#"{"selected_index": -1, "match_confidence": "none", "reasoning": "no fit"}"#,
            r#"{"selected_index": 7, "match_confidence": "high", "reasoning": "bogus"}"#,
        ] {
            let result = RemoteSelector::new(canned(answer))
                .select(&candidate(), &issues())
                .await
                .unwrap();
            assert!(result.selected.is_none());
            assert_eq!(result.confidence, MatchConfidence::None);
            assert!(!result.reasoning.is_empty());
        }
    }

    #[tokio::test]
    async fn test_empty_list_skips_remote_call() {
        let completion = canned("{}");
        let result = RemoteSelector::new(completion.clone())
            .select(&candidate(), &[])
            .await
            .unwrap();

        assert_eq!(result.reasoning, NO_CANDIDATES);
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_undecodable_answer_is_error() {
        let err = RemoteSelector::new(canned("no idea"))
            .select(&candidate(), &issues())
            .await
            .unwrap_err();
        assert!(matches!(err, MatchError::InvalidResponse(_)));
    }
}
