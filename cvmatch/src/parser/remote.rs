//! Completion-backed filename parser

use super::rules::clean_basename;
use super::FilenameParser;
use crate::error::ParseError;
use crate::models::{Candidate, Confidence};
use crate::prompts::{filename_parse_prompt, RemoteCandidate};
use crate::services::{extract_json, Completion};
use std::sync::Arc;

/// Asks the completion service to extract the candidate fields.
///
/// `original_filename` is always the caller's input, whatever the answer
/// says. Retries and credential handling live in the [`Completion`]
/// implementation.
pub struct RemoteParser {
    completion: Arc<dyn Completion>,
}

impl RemoteParser {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self { completion }
    }
}

#[async_trait::async_trait]
impl FilenameParser for RemoteParser {
    fn name(&self) -> &str {
        "remote"
    }

    async fn parse(&self, filename: &str) -> Result<Candidate, ParseError> {
        if clean_basename(filename).is_empty() {
            return Err(ParseError::EmptyFilename);
        }

        let response = self.completion.complete(&filename_parse_prompt(filename)).await?;
        let json = extract_json(&response);

        let parsed: RemoteCandidate = serde_json::from_str(json).map_err(|e| {
            tracing::warn!(filename, error = %e, "Remote parser returned undecodable JSON");
            ParseError::InvalidResponse(format!("{}: {}", e, truncate(json, 200)))
        })?;

        if parsed.title.trim().is_empty() {
            return Err(ParseError::InvalidResponse("answer has no title".to_string()));
        }

        let issue = if parsed.issue_number.trim().is_empty() {
            "1".to_string()
        } else {
            parsed.issue_number.trim().to_string()
        };

        let candidate = Candidate::new(filename, parsed.title.trim(), issue)
            .with_year(parsed.year)
            .with_publisher(parsed.publisher)
            .with_volume(parsed.volume_number)
            .with_confidence(Confidence::from_label(&parsed.confidence))
            .with_notes(parsed.notes);

        tracing::debug!(
            filename,
            series = %candidate.series,
            issue = %candidate.issue_number,
            confidence = %candidate.confidence,
            "Remote parse complete"
        );
        Ok(candidate)
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompletionError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedCompletion {
        answer: Result<String, String>,
        calls: AtomicUsize,
    }

    impl CannedCompletion {
        fn ok(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(answer.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn auth_failure() -> Arc<Self> {
            Arc::new(Self {
                answer: Err("invalid x-api-key".to_string()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl Completion for CannedCompletion {
        async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
                .clone()
                .map_err(CompletionError::Authentication)
        }
    }

    #[tokio::test]
    async fn test_fenced_answer_is_decoded() {
        let completion = CannedCompletion::ok(
            "```json\n{\"title\": \"Absolute Superman\", \"issue_number\": \"3\", \"year\": \"2025\", \
             \"publisher\": \"DC Comics\", \"volume_number\": \"\", \"confidence\": \"high\", \"notes\": \"\"}\n```",
        );
        let parser = RemoteParser::new(completion.clone());

        let c = parser.parse("Absolute Superman 003 (2025).cbz").await.unwrap();

        assert_eq!(c.series, "Absolute Superman");
        assert_eq!(c.issue_number, "3");
        assert_eq!(c.publisher.as_deref(), Some("DC Comics"));
        assert_eq!(c.confidence, Confidence::High);
        assert!(c.volume_number.is_none());
        assert_eq!(completion.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_original_filename_is_always_the_input() {
        let completion = CannedCompletion::ok(
            r#"{"original_filename": "something else", "title": "Saga", "issue_number": "1", "confidence": "medium"}"#,
        );
        let parser = RemoteParser::new(completion);

        let c = parser.parse("Saga_001.cbz").await.unwrap();
        assert_eq!(c.original_filename, "Saga_001.cbz");
        assert_eq!(c.confidence, Confidence::Medium);
    }

    #[tokio::test]
    async fn test_empty_filename_skips_remote_call() {
        let completion = CannedCompletion::ok("{}");
        let parser = RemoteParser::new(completion.clone());

        assert!(matches!(parser.parse("  ").await, Err(ParseError::EmptyFilename)));
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_non_json_answer_is_invalid_response() {
        let parser = RemoteParser::new(CannedCompletion::ok("I cannot help with that."));
        assert!(matches!(
            parser.parse("Batman 001.cbz").await,
            Err(ParseError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_title_is_invalid_response() {
        let parser = RemoteParser::new(CannedCompletion::ok(r#"{"issue_number": "4"}"#));
        assert!(matches!(
            parser.parse("Batman 004.cbz").await,
            Err(ParseError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_completion_failure_is_remote_error() {
        let parser = RemoteParser::new(CannedCompletion::auth_failure());
        assert!(matches!(
            parser.parse("Batman 004.cbz").await,
            Err(ParseError::Remote(CompletionError::Authentication(_)))
        ));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("ÜberÜber", 4), "Über");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
