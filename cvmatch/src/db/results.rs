//! Result store: upsert per filename, filtered queries

use crate::error::PersistError;
use crate::models::{normalize_issue_number, Candidate, CandidateIssue, Confidence, ProcessingResult};
use chrono::{DateTime, Utc};
use cvmatch_common::RetryPolicy;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::time::{Duration, Instant};
use tracing::debug;

/// Persisted outcome of one filename
#[async_trait::async_trait]
pub trait ResultStore: Send + Sync {
    /// Insert or replace the record for `result.filename`
    async fn save(&self, result: &ProcessingResult) -> Result<(), PersistError>;

    /// Insert or replace the parse-only record for `(filename, parser)`
    async fn save_parsed(&self, candidate: &Candidate, parser: &str) -> Result<(), PersistError>;

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, PersistError>;

    /// Whether a result for exactly `filename` is stored, successful or not
    async fn exists(&self, filename: &str) -> Result<bool, PersistError>;
}

/// Flattened view of a [`ProcessingResult`] as stored and queried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub filename: String,
    pub success: bool,
    pub error: Option<String>,
    pub failed_stage: Option<String>,
    pub series: Option<String>,
    pub issue_number: Option<String>,
    pub year: Option<String>,
    pub publisher: Option<String>,
    pub catalog_id: Option<i64>,
    pub catalog_url: Option<String>,
    pub confidence: Option<String>,
    pub reasoning: Option<String>,
    pub matched_by: Option<String>,
    pub processed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl StoredRecord {
    pub fn from_result(result: &ProcessingResult) -> Self {
        let matched = result.match_result.as_ref();
        let candidate = matched.map(|m| &m.candidate);
        let selected = matched.and_then(|m| m.selected.as_ref());

        Self {
            filename: result.filename.clone(),
            success: result.success,
            error: result.error.clone(),
            failed_stage: result.failed_stage.map(|s| s.to_string()),
            series: candidate.map(|c| c.series.clone()),
            issue_number: candidate.map(|c| c.issue_number.clone()),
            year: candidate.and_then(|c| c.year.clone()),
            publisher: selected
                .and_then(|i| i.publisher_name())
                .map(str::to_string)
                .or_else(|| candidate.and_then(|c| c.publisher.clone())),
            catalog_id: matched.and_then(|m| m.catalog_id).and_then(|id| i64::try_from(id).ok()),
            catalog_url: matched.and_then(|m| m.catalog_url.clone()),
            confidence: matched.map(|m| m.confidence.to_string()),
            reasoning: matched.map(|m| m.reasoning.clone()),
            matched_by: matched.and_then(|m| m.matched_by.clone()),
            processed_at: result.processed_at,
            duration_ms: i64::try_from(result.duration_ms).unwrap_or(i64::MAX),
        }
    }

    fn issue_normalized(&self) -> Option<String> {
        self.issue_number.as_deref().map(normalize_issue_number)
    }
}

/// Query filter; all present fields must match
///
/// `series` and `publisher` are case-insensitive substring matches, `issue`
/// compares normalized issue numbers, `year` is exact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub series: Option<String>,
    pub issue: Option<String>,
    pub year: Option<String>,
    pub publisher: Option<String>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Case folding shared by both stores; SQLite's `lower()` only folds ASCII
pub(crate) fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| fold_case(h).contains(&fold_case(needle)))
}

impl RecordFilter {
    pub fn matches(&self, record: &StoredRecord) -> bool {
        if let Some(series) = &self.series {
            if !contains_ci(record.series.as_deref(), series) {
                return false;
            }
        }
        if let Some(issue) = &self.issue {
            if record.issue_normalized() != Some(normalize_issue_number(issue)) {
                return false;
            }
        }
        if let Some(year) = &self.year {
            if record.year.as_ref() != Some(year) {
                return false;
            }
        }
        if let Some(publisher) = &self.publisher {
            if !contains_ci(record.publisher.as_deref(), publisher) {
                return false;
            }
        }
        true
    }
}

/// SQLite-backed [`ResultStore`]
///
/// Writes retry on `database is locked` with a short bounded backoff; any
/// other database error is returned as-is.
#[derive(Clone)]
pub struct SqliteResultStore {
    pool: SqlitePool,
    lock_retry: RetryPolicy,
}

impl SqliteResultStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            lock_retry: RetryPolicy::new(6, Duration::from_millis(25))
                .with_max_delay(Duration::from_secs(1)),
        }
    }

    /// Private in-memory database, schema included
    pub async fn in_memory() -> Result<Self, PersistError> {
        // One connection that never idles out, so the database lives as long as the pool
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        super::init_tables(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn with_lock_retry(mut self, policy: RetryPolicy) -> Self {
        self.lock_retry = policy;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn retry_locked<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, PersistError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, PersistError>>,
    {
        let started = Instant::now();
        match self.lock_retry.run(operation, PersistError::is_lock_error, f).await {
            Err(e) if e.is_lock_error() => Err(PersistError::Locked {
                attempts: self.lock_retry.max_attempts,
                elapsed_ms: started.elapsed().as_millis(),
            }),
            other => other,
        }
    }

    async fn save_once(&self, result: &ProcessingResult) -> Result<(), PersistError> {
        let record = StoredRecord::from_result(result);
        let result_json = serde_json::to_string(result)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO processing_results (
                filename, success, error, failed_stage, series, series_folded,
                issue_number, issue_normalized, year, publisher, publisher_folded,
                catalog_id, catalog_url, confidence, reasoning, matched_by,
                result_json, processed_at, duration_ms, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
            ON CONFLICT(filename) DO UPDATE SET
                success = excluded.success,
                error = excluded.error,
                failed_stage = excluded.failed_stage,
                series = excluded.series,
                series_folded = excluded.series_folded,
                issue_number = excluded.issue_number,
                issue_normalized = excluded.issue_normalized,
                year = excluded.year,
                publisher = excluded.publisher,
                publisher_folded = excluded.publisher_folded,
                catalog_id = excluded.catalog_id,
                catalog_url = excluded.catalog_url,
                confidence = excluded.confidence,
                reasoning = excluded.reasoning,
                matched_by = excluded.matched_by,
                result_json = excluded.result_json,
                processed_at = excluded.processed_at,
                duration_ms = excluded.duration_ms,
                updated_at = datetime('now')
            "#,
        )
        .bind(&record.filename)
        .bind(record.success)
        .bind(&record.error)
        .bind(&record.failed_stage)
        .bind(&record.series)
        .bind(record.series.as_deref().map(fold_case))
        .bind(&record.issue_number)
        .bind(record.issue_normalized())
        .bind(&record.year)
        .bind(&record.publisher)
        .bind(record.publisher.as_deref().map(fold_case))
        .bind(record.catalog_id)
        .bind(&record.catalog_url)
        .bind(&record.confidence)
        .bind(&record.reasoning)
        .bind(&record.matched_by)
        .bind(&result_json)
        .bind(record.processed_at)
        .bind(record.duration_ms)
        .execute(&mut *tx)
        .await?;

        if let Some(issue) = result.match_result.as_ref().and_then(|m| m.selected.as_ref()) {
            save_issue(&mut tx, issue).await?;
        }

        tx.commit().await?;
        debug!(filename = %record.filename, "Saved processing result");
        Ok(())
    }

    async fn save_parsed_once(&self, candidate: &Candidate, parser: &str) -> Result<(), PersistError> {
        sqlx::query(
            r#"
            INSERT INTO parsed_filenames (
                filename, parser, series, issue_number, year, publisher,
                volume_number, confidence, notes, parsed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
            ON CONFLICT(filename, parser) DO UPDATE SET
                series = excluded.series,
                issue_number = excluded.issue_number,
                year = excluded.year,
                publisher = excluded.publisher,
                volume_number = excluded.volume_number,
                confidence = excluded.confidence,
                notes = excluded.notes,
                parsed_at = datetime('now')
            "#,
        )
        .bind(&candidate.original_filename)
        .bind(parser)
        .bind(&candidate.series)
        .bind(&candidate.issue_number)
        .bind(&candidate.year)
        .bind(&candidate.publisher)
        .bind(&candidate.volume_number)
        .bind(candidate.confidence.as_str())
        .bind(&candidate.notes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Parse-only records for one filename, keyed by parser name
    pub async fn load_parsed(&self, filename: &str) -> Result<Vec<(String, Candidate)>, PersistError> {
        let rows = sqlx::query(
            r#"
            SELECT filename, parser, series, issue_number, year, publisher,
                   volume_number, confidence, notes
            FROM parsed_filenames
            WHERE filename = ?
            ORDER BY parser
            "#,
        )
        .bind(filename)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let mut candidate = Candidate::new(
                    row.get::<String, _>("filename"),
                    row.get::<String, _>("series"),
                    row.get::<String, _>("issue_number"),
                )
                .with_confidence(Confidence::from_label(&row.get::<String, _>("confidence")));
                candidate.year = row.get("year");
                candidate.publisher = row.get("publisher");
                candidate.volume_number = row.get("volume_number");
                candidate.notes = row.get("notes");
                (row.get::<String, _>("parser"), candidate)
            })
            .collect())
    }

    /// Full stored [`ProcessingResult`] for one filename
    pub async fn load_result(&self, filename: &str) -> Result<Option<ProcessingResult>, PersistError> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT result_json FROM processing_results WHERE filename = ?")
                .bind(filename)
                .fetch_optional(&self.pool)
                .await?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

async fn save_issue(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    issue: &CandidateIssue,
) -> Result<(), PersistError> {
    let raw = serde_json::to_string(&issue.raw)?;
    sqlx::query(
        r#"
        INSERT INTO catalog_issues (
            id, volume_id, volume_name, issue_number, name, cover_date,
            publisher, site_detail_url, raw_json, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
        ON CONFLICT(id) DO UPDATE SET
            volume_id = excluded.volume_id,
            volume_name = excluded.volume_name,
            issue_number = excluded.issue_number,
            name = excluded.name,
            cover_date = excluded.cover_date,
            publisher = excluded.publisher,
            site_detail_url = excluded.site_detail_url,
            raw_json = excluded.raw_json,
            updated_at = datetime('now')
        "#,
    )
    .bind(i64::try_from(issue.id).unwrap_or(i64::MAX))
    .bind(i64::try_from(issue.volume.id).unwrap_or(i64::MAX))
    .bind(&issue.volume.name)
    .bind(&issue.issue_number)
    .bind(&issue.name)
    .bind(&issue.cover_date)
    .bind(issue.publisher_name())
    .bind(&issue.site_detail_url)
    .bind(raw)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn record_from_row(row: &SqliteRow) -> StoredRecord {
    StoredRecord {
        filename: row.get("filename"),
        success: row.get("success"),
        error: row.get("error"),
        failed_stage: row.get("failed_stage"),
        series: row.get("series"),
        issue_number: row.get("issue_number"),
        year: row.get("year"),
        publisher: row.get("publisher"),
        catalog_id: row.get("catalog_id"),
        catalog_url: row.get("catalog_url"),
        confidence: row.get("confidence"),
        reasoning: row.get("reasoning"),
        matched_by: row.get("matched_by"),
        processed_at: row.get("processed_at"),
        duration_ms: row.get("duration_ms"),
    }
}

#[async_trait::async_trait]
impl ResultStore for SqliteResultStore {
    async fn save(&self, result: &ProcessingResult) -> Result<(), PersistError> {
        self.retry_locked("save processing result", || self.save_once(result))
            .await
    }

    async fn save_parsed(&self, candidate: &Candidate, parser: &str) -> Result<(), PersistError> {
        self.retry_locked("save parsed filename", || self.save_parsed_once(candidate, parser))
            .await
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<StoredRecord>, PersistError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT filename, success, error, failed_stage, series, issue_number,
                   year, publisher, catalog_id, catalog_url, confidence, reasoning,
                   matched_by, processed_at, duration_ms
            FROM processing_results
            WHERE 1 = 1
            "#,
        );

        // instr() is a literal substring test; LIKE would treat % and _ as wildcards
        if let Some(series) = &filter.series {
            qb.push(" AND instr(series_folded, ")
                .push_bind(fold_case(series))
                .push(") > 0");
        }
        if let Some(issue) = &filter.issue {
            qb.push(" AND issue_normalized = ")
                .push_bind(normalize_issue_number(issue));
        }
        if let Some(year) = &filter.year {
            qb.push(" AND year = ").push_bind(year.clone());
        }
        if let Some(publisher) = &filter.publisher {
            qb.push(" AND instr(publisher_folded, ")
                .push_bind(fold_case(publisher))
                .push(") > 0");
        }

        // SQLite needs a LIMIT before OFFSET; -1 means unbounded
        let limit = filter
            .limit
            .and_then(|l| i64::try_from(l).ok())
            .unwrap_or(-1);
        qb.push(" ORDER BY filename LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(i64::try_from(filter.offset).unwrap_or(i64::MAX));

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn exists(&self, filename: &str) -> Result<bool, PersistError> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM processing_results WHERE filename = ?)",
        )
        .bind(filename)
        .fetch_one(&self.pool)
        .await?;
        Ok(found)
    }
}
