//! In-process result store, used by `--no-store` runs and tests

use super::results::{RecordFilter, ResultStore, StoredRecord};
use crate::error::PersistError;
use crate::models::{Candidate, ProcessingResult};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Same upsert and filter semantics as the SQLite store, nothing persisted
#[derive(Default)]
pub struct MemoryResultStore {
    // BTreeMap keeps query output ordered by filename
    results: RwLock<BTreeMap<String, StoredRecord>>,
    parsed: RwLock<HashMap<(String, String), Candidate>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.results.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.results.read().await.is_empty()
    }

    pub async fn parsed(&self, filename: &str, parser: &str) -> Option<Candidate> {
        self.parsed
            .read()
            .await
            .get(&(filename.to_string(), parser.to_string()))
            .cloned()
    }
}

#[async_trait::async_trait]
impl ResultStore for MemoryResultStore {
    async fn save(&self, result: &ProcessingResult) -> Result<(), PersistError> {
        let record = StoredRecord::from_result(result);
        self.results.write().await.insert(record.filename.clone(), record);
        Ok(())
    }

    async fn save_parsed(&self, candidate: &Candidate, parser: &str) -> Result<(), PersistError> {
        self.parsed.write().await.insert(
            (candidate.original_filename.clone(), parser.to_string()),
            candidate.clone(),
        );
        Ok(())
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, PersistError> {
        let results = self.results.read().await;
        Ok(results
            .values()
            .filter(|record| filter.matches(record))
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn exists(&self, filename: &str) -> Result<bool, PersistError> {
        Ok(self.results.read().await.contains_key(filename))
    }
}
