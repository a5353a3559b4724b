//! Human-in-the-loop selection over a line-oriented prompt

use super::{Selector, NO_CANDIDATES};
use crate::error::MatchError;
use crate::models::{Candidate, CandidateIssue, MatchConfidence, MatchResult};
use std::io::{BufRead, BufReader, Write};
use std::sync::{Arc, Mutex};

struct PromptIo {
    input: Box<dyn BufRead + Send>,
    output: Box<dyn Write + Send>,
}

/// Prints the candidate list and reads a numeric choice.
///
/// The prompt is held for the whole interaction, so concurrent workers queue
/// up behind one another. `0` is an explicit "no match"; anything that is not
/// a listed number re-prompts; end of input is [`MatchError::InputClosed`].
#[derive(Clone)]
pub struct InteractiveSelector {
    io: Arc<Mutex<PromptIo>>,
}

impl InteractiveSelector {
    pub fn new(input: Box<dyn BufRead + Send>, output: Box<dyn Write + Send>) -> Self {
        Self {
            io: Arc::new(Mutex::new(PromptIo { input, output })),
        }
    }

    /// Reads from stdin, prompts on stderr so stdout stays machine-readable
    pub fn stdio() -> Self {
        Self::new(
            Box::new(BufReader::new(std::io::stdin())),
            Box::new(std::io::stderr()),
        )
    }
}

fn interact(
    io: &mut PromptIo,
    candidate: &Candidate,
    issues: &[CandidateIssue],
) -> Result<MatchResult, MatchError> {
    let out = &mut io.output;

    writeln!(out)?;
    writeln!(out, "File: {}", candidate.original_filename)?;
    write!(out, "Parsed: {} #{}", candidate.series, candidate.issue_number)?;
    if let Some(year) = &candidate.year {
        write!(out, " ({})", year)?;
    }
    writeln!(out)?;

    if issues.is_empty() {
        writeln!(out, "No catalog results; recording no match.")?;
        out.flush()?;
        return Ok(MatchResult::none(candidate, NO_CANDIDATES));
    }

    for (idx, issue) in issues.iter().enumerate() {
        writeln!(out, "  [{}] {}", idx + 1, issue.display_line())?;
    }
    writeln!(out, "  [0] None of these")?;

    let mut line = String::new();
    loop {
        write!(out, "Enter selection [0-{}]: ", issues.len())?;
        out.flush()?;

        line.clear();
        if io.input.read_line(&mut line)? == 0 {
            return Err(MatchError::InputClosed);
        }

        match line.trim().parse::<usize>() {
            Ok(0) => return Ok(MatchResult::none(candidate, "user selected no match")),
            Ok(choice) if choice <= issues.len() => {
                let issue = &issues[choice - 1];
                return Ok(MatchResult::selected(
                    candidate,
                    issue,
                    MatchConfidence::High,
                    "user manual selection",
                )
                .matched_by("interactive"));
            }
            _ => {
                writeln!(out, "Invalid selection '{}'", line.trim())?;
            }
        }
    }
}

#[async_trait::async_trait]
impl Selector for InteractiveSelector {
    fn name(&self) -> &str {
        "interactive"
    }

    async fn select(
        &self,
        candidate: &Candidate,
        issues: &[CandidateIssue],
    ) -> Result<MatchResult, MatchError> {
        let io = self.io.clone();
        let candidate = candidate.clone();
        let issues = issues.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = io
                .lock()
                .map_err(|_| MatchError::Internal("prompt lock poisoned".to_string()))?;
            interact(&mut guard, &candidate, &issues)
        })
        .await
        .map_err(|e| MatchError::Internal(format!("prompt task failed: {}", e)))?
    }
}
