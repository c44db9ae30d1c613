//! SQLite connection setup
//!
//! The manifest is a single-file database tuned for one writer and
//! concurrent readers: WAL journaling, NORMAL synchronous mode, a large
//! page cache and memory-mapped reads. Readers (stats, pending queries)
//! may open their own pools against the same file.

use std::path::Path;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::store::StoreError;

/// Memory-map window for reads (256 MB)
const MMAP_SIZE_BYTES: u64 = 268_435_456;

/// Open (creating if missing) the manifest database at `db_path`.
pub async fn connect(db_path: &Path, cache_size_mb: u32) -> Result<SqlitePool, StoreError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        // Negative cache_size is interpreted by SQLite as KB
        .pragma("cache_size", format!("-{}", cache_size_mb as u64 * 1024))
        .pragma("temp_store", "MEMORY")
        .pragma("mmap_size", MMAP_SIZE_BYTES.to_string());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Open the manifest read-only, for stats and listing queries that run
/// alongside a writer.
pub async fn connect_read_only(db_path: &Path) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true)
        .journal_mode(SqliteJournalMode::Wal)
        .pragma("mmap_size", MMAP_SIZE_BYTES.to_string());

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await?;

    Ok(pool)
}
