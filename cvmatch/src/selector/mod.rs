//! Disambiguation: choose at most one catalog issue for a candidate
//!
//! Every selector honours the same contract:
//! - an empty issue list yields confidence `none` with reasoning
//!   [`NO_CANDIDATES`], without consulting any strategy
//! - `reasoning` is always populated
//!
//! Implementations: [`AutoSelector`] (ordered matcher chain),
//! [`InteractiveSelector`] (human prompt), [`RemoteSelector`] (completion service).

pub mod auto;
pub mod interactive;
pub mod matchers;
pub mod remote;

pub use auto::{AutoSelector, MatcherChain};
pub use interactive::InteractiveSelector;
pub use matchers::{ExactNameMatcher, MatchQuery, Matcher, SimilarityMatcher};
pub use remote::RemoteSelector;

use crate::error::MatchError;
use crate::models::{Candidate, CandidateIssue, MatchResult};

pub const NO_CANDIDATES: &str = "no candidates returned";

#[async_trait::async_trait]
pub trait Selector: Send + Sync {
    fn name(&self) -> &str;

    async fn select(
        &self,
        candidate: &Candidate,
        issues: &[CandidateIssue],
    ) -> Result<MatchResult, MatchError>;
}
