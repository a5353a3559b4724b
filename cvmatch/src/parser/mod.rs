//! Filename parsing
//!
//! Every parser turns one filename into one [`Candidate`]. Implementations:
//! - [`RuleParser`]: ordered shape rules, pure and deterministic
//! - [`RemoteParser`]: completion-service extraction
//! - [`ChainParser`]: primary parser with a fallback for non-high confidence

pub mod chain;
pub mod remote;
pub mod rules;

pub use chain::ChainParser;
pub use remote::RemoteParser;
pub use rules::RuleParser;

use crate::error::ParseError;
use crate::models::Candidate;

/// Filename → candidate capability
///
/// Only an empty cleaned filename (or, for remote parsers, a failed remote
/// call) is an error; anything else degrades to a low-confidence candidate.
#[async_trait::async_trait]
pub trait FilenameParser: Send + Sync {
    /// Parser name recorded with parse-only results
    fn name(&self) -> &str;

    async fn parse(&self, filename: &str) -> Result<Candidate, ParseError>;
}
