//! Primary parser with a fallback for uncertain results

use super::FilenameParser;
use crate::error::ParseError;
use crate::models::{Candidate, Confidence};
use std::sync::Arc;

/// Runs `primary`; consults `fallback` when the primary fails or is not
/// highly confident. When the fallback fails too, the primary's candidate
/// (if any) is kept.
pub struct ChainParser {
    primary: Arc<dyn FilenameParser>,
    fallback: Arc<dyn FilenameParser>,
    name: String,
}

impl ChainParser {
    pub fn new(primary: Arc<dyn FilenameParser>, fallback: Arc<dyn FilenameParser>) -> Self {
        let name = format!("chain({}>{})", primary.name(), fallback.name());
        Self {
            primary,
            fallback,
            name,
        }
    }
}

#[async_trait::async_trait]
impl FilenameParser for ChainParser {
    fn name(&self) -> &str {
        &self.name
    }

    async fn parse(&self, filename: &str) -> Result<Candidate, ParseError> {
        let primary = match self.primary.parse(filename).await {
            Ok(candidate) if candidate.confidence == Confidence::High => return Ok(candidate),
            Ok(candidate) => Some(candidate),
            Err(ParseError::EmptyFilename) => return Err(ParseError::EmptyFilename),
            Err(e) => {
                tracing::debug!(filename, parser = self.primary.name(), error = %e, "Primary parser failed");
                None
            }
        };

        tracing::debug!(filename, parser = self.fallback.name(), "Consulting fallback parser");

        match (self.fallback.parse(filename).await, primary) {
            (Ok(candidate), _) => Ok(candidate),
            (Err(e), Some(candidate)) => {
                tracing::warn!(filename, error = %e, "Fallback parser failed, keeping primary result");
                Ok(candidate)
            }
            (Err(e), None) => Err(e),
        }
    }
}
