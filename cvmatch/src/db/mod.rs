//! Result persistence
//!
//! Opens the SQLite database, creates tables on first use and exposes the
//! [`ResultStore`] capability with SQLite and in-memory implementations.

pub mod memory;
pub mod results;

pub use memory::MemoryResultStore;
pub use results::{RecordFilter, ResultStore, SqliteResultStore, StoredRecord};

use crate::error::PersistError;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (creating if needed) the database at `db_path` and ensure the schema exists
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool, PersistError> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets the query command read while a batch is writing
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    init_tables(&pool).await?;
    Ok(pool)
}

/// Create all tables and indexes; idempotent
pub async fn init_tables(pool: &SqlitePool) -> Result<(), PersistError> {
    create_processing_results_table(pool).await?;
    create_parsed_filenames_table(pool).await?;
    create_catalog_issues_table(pool).await?;
    Ok(())
}

async fn create_processing_results_table(pool: &SqlitePool) -> Result<(), PersistError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processing_results (
            filename TEXT PRIMARY KEY,
            success INTEGER NOT NULL,
            error TEXT,
            failed_stage TEXT,
            series TEXT,
            series_folded TEXT,
            issue_number TEXT,
            issue_normalized TEXT,
            year TEXT,
            publisher TEXT,
            publisher_folded TEXT,
            catalog_id INTEGER,
            catalog_url TEXT,
            confidence TEXT,
            reasoning TEXT,
            matched_by TEXT,
            result_json TEXT NOT NULL,
            processed_at TEXT NOT NULL,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_results_series ON processing_results(series)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_results_catalog_id ON processing_results(catalog_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_parsed_filenames_table(pool: &SqlitePool) -> Result<(), PersistError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parsed_filenames (
            filename TEXT NOT NULL,
            parser TEXT NOT NULL,
            series TEXT NOT NULL,
            issue_number TEXT NOT NULL,
            year TEXT,
            publisher TEXT,
            volume_number TEXT,
            confidence TEXT NOT NULL,
            notes TEXT,
            parsed_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (filename, parser)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_catalog_issues_table(pool: &SqlitePool) -> Result<(), PersistError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_issues (
            id INTEGER PRIMARY KEY,
            volume_id INTEGER,
            volume_name TEXT,
            issue_number TEXT,
            name TEXT,
            cover_date TEXT,
            publisher TEXT,
            site_detail_url TEXT,
            raw_json TEXT,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
