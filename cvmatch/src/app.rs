//! Component assembly from resolved configuration
//!
//! The binary picks a parser and a selector by name; this module turns those
//! choices plus an [`AppConfig`] into the trait objects the coordinator runs.

use crate::db::ResultStore;
use crate::parser::{ChainParser, FilenameParser, RemoteParser, RuleParser};
use crate::selector::{AutoSelector, InteractiveSelector, RemoteSelector, Selector};
use crate::services::{Completion, CompletionClient};
use cvmatch_common::config::{AppConfig, Requirements};
use cvmatch_common::{Error, Result};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ParserKind {
    /// Local shape rules only
    #[default]
    Rules,
    /// Completion service only
    Remote,
    /// Rules first, completion service when the rules are not confident
    Chain,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SelectorKind {
    /// Exact name, then similarity matcher
    #[default]
    Auto,
    /// Completion service picks among the results
    Remote,
}

impl ParserKind {
    pub fn needs_completion(&self) -> bool {
        matches!(self, ParserKind::Remote | ParserKind::Chain)
    }
}

/// Credentials a run needs; `catalog` is false for parse-only runs
pub fn requirements(
    parser: ParserKind,
    selector: Option<SelectorKind>,
    interactive: bool,
) -> Requirements {
    let remote_selector = !interactive && selector == Some(SelectorKind::Remote);
    Requirements {
        catalog: selector.is_some() || interactive,
        completion: parser.needs_completion() || remote_selector,
    }
}

pub fn build_completion(config: &AppConfig) -> Result<Arc<dyn Completion>> {
    let client = CompletionClient::from_config(config)
        .map_err(|e| Error::Config(format!("completion client: {}", e)))?;
    Ok(Arc::new(client))
}

fn require_completion(completion: Option<&Arc<dyn Completion>>, what: &str) -> Result<Arc<dyn Completion>> {
    completion
        .cloned()
        .ok_or_else(|| Error::Config(format!("{} requires the completion service", what)))
}

pub fn build_parser(
    kind: ParserKind,
    completion: Option<&Arc<dyn Completion>>,
) -> Result<Arc<dyn FilenameParser>> {
    Ok(match kind {
        ParserKind::Rules => Arc::new(RuleParser::new()),
        ParserKind::Remote => Arc::new(RemoteParser::new(require_completion(completion, "remote parser")?)),
        ParserKind::Chain => Arc::new(ChainParser::new(
            Arc::new(RuleParser::new()),
            Arc::new(RemoteParser::new(require_completion(completion, "chain parser")?)),
        )),
    })
}

/// Interactive mode takes precedence over `kind`
pub fn build_selector(
    kind: SelectorKind,
    interactive: bool,
    completion: Option<&Arc<dyn Completion>>,
) -> Result<Arc<dyn Selector>> {
    if interactive {
        return Ok(Arc::new(InteractiveSelector::stdio()));
    }
    Ok(match kind {
        SelectorKind::Auto => Arc::new(AutoSelector::default()),
        SelectorKind::Remote => Arc::new(RemoteSelector::new(require_completion(completion, "remote selector")?)),
    })
}

/// Drop filenames that already have a stored result
///
/// A failed lookup keeps the filename so it is processed again.
pub async fn skip_existing(store: &dyn ResultStore, filenames: Vec<String>) -> Vec<String> {
    let mut pending = Vec::with_capacity(filenames.len());
    for filename in filenames {
        match store.exists(&filename).await {
            Ok(true) => info!(filename = %filename, "Skipping, already stored"),
            Ok(false) => pending.push(filename),
            Err(e) => {
                warn!(filename = %filename, error = %e, "Could not check stored results, processing");
                pending.push(filename);
            }
        }
    }
    pending
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirements() {
        let r = requirements(ParserKind::Rules, Some(SelectorKind::Auto), false);
        assert!(r.catalog && !r.completion);

        let r = requirements(ParserKind::Chain, None, false);
        assert!(!r.catalog && r.completion);

        let r = requirements(ParserKind::Rules, Some(SelectorKind::Remote), true);
        assert!(r.catalog && !r.completion);
    }

    #[test]
    fn test_remote_components_need_completion() {
        assert!(build_parser(ParserKind::Rules, None).is_ok());
        assert!(matches!(build_parser(ParserKind::Chain, None), Err(Error::Config(_))));
        assert!(matches!(
            build_selector(SelectorKind::Remote, false, None),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_skip_existing_filters_stored_filenames() {
        use crate::db::MemoryResultStore;
        use crate::models::{Candidate, MatchResult, ProcessingResult};

        let store = MemoryResultStore::new();
        let stored = Candidate::new("Saga 001.cbz", "Saga", "001");
        store
            .save(&ProcessingResult::succeeded(
                "Saga 001.cbz",
                MatchResult::none(&stored, "no candidates returned"),
                1,
            ))
            .await
            .unwrap();

        let input = vec![
            "Saga 002.cbz".to_string(),
            "Saga 001.cbz".to_string(),
            "saga 001.cbz".to_string(),
            "Batman 001.cbz".to_string(),
        ];
        let pending = skip_existing(&store, input).await;

        assert_eq!(pending, vec!["Saga 002.cbz", "saga 001.cbz", "Batman 001.cbz"]);
    }

    #[test]
    fn test_chain_parser_name() {
        let config = AppConfig {
            anthropic_api_key: Some("k".to_string()),
            ..AppConfig::default()
        };
        let completion = build_completion(&config).unwrap();
        let parser = build_parser(ParserKind::Chain, Some(&completion)).unwrap();
        assert_eq!(parser.name(), "chain(rules>remote)");
    }
}
