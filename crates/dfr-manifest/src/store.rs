//! Manifest store operations

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use thiserror::Error;
use tracing::debug;

use crate::record::{FileRecord, IngestionCounts, IngestionStatus, ManifestCounts, PendingFile};
use crate::schema::{CREATE_INDEXES_SQL, CREATE_TABLE_SQL, SCHEMA_VERSION};

/// Errors from manifest persistence
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable manifest table access. Cheap to clone; clones share the pool.
///
/// The discovery engine is the only writer during bootstrap and the
/// ingestion engine the only writer during ingestion; WAL mode lets stats
/// and pending queries read concurrently with either.
#[derive(Clone)]
pub struct ManifestStore {
    pool: SqlitePool,
}

impl ManifestStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the manifest table and indexes if absent. Safe to call on
    /// every startup.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE_SQL).execute(&self.pool).await?;
        for index_sql in CREATE_INDEXES_SQL {
            sqlx::query(index_sql).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert a batch of records, ignoring paths that already exist, and
    /// refresh `last_seen` for every path presented. Atomic: a failure
    /// rolls the whole batch back.
    ///
    /// Returns `(inserted, skipped)` where `skipped` counts paths that were
    /// already present (their discovery fields are left untouched).
    pub async fn bulk_upsert(&self, records: &[FileRecord]) -> Result<(u64, u64), StoreError> {
        if records.is_empty() {
            return Ok((0, 0));
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for record in records {
            let path = record.path_str();
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO manifest (
                    file_path, file_name, parent_dir, size, mtime,
                    raw_acl, acl_captured, status, error, is_directory,
                    schema_version
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&path)
            .bind(&record.file_name)
            .bind(record.parent_dir.to_string_lossy().as_ref())
            .bind(record.size)
            .bind(record.mtime)
            .bind(&record.raw_acl)
            .bind(record.acl_captured)
            .bind(record.status.as_str())
            .bind(&record.error)
            .bind(record.is_directory)
            .bind(SCHEMA_VERSION)
            .execute(&mut *tx)
            .await?;

            inserted += result.rows_affected();

            // Re-observation is an idempotent refresh; newly inserted rows
            // get the same timestamp their default already set.
            sqlx::query("UPDATE manifest SET last_seen = CURRENT_TIMESTAMP WHERE file_path = ?")
                .bind(&path)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        let skipped = records.len() as u64 - inserted;
        debug!(
            batch_size = records.len(),
            inserted, skipped, "batch_flushed"
        );
        Ok((inserted, skipped))
    }

    /// Record a permission failure for a single path, bumping `retry_count`
    /// when the path was already known.
    pub async fn record_permission_error(
        &self,
        record: &FileRecord,
    ) -> Result<(), StoreError> {
        let path = record.path_str();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO manifest (
                file_path, file_name, parent_dir, status, error,
                is_directory, schema_version
            )
            VALUES (?, ?, ?, 'permission_denied', ?, ?, ?)
            "#,
        )
        .bind(&path)
        .bind(&record.file_name)
        .bind(record.parent_dir.to_string_lossy().as_ref())
        .bind(&record.error)
        .bind(record.is_directory)
        .bind(SCHEMA_VERSION)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            sqlx::query(
                r#"
                UPDATE manifest
                SET status = 'permission_denied',
                    error = ?,
                    is_directory = ?,
                    retry_count = retry_count + 1,
                    last_seen = CURRENT_TIMESTAMP
                WHERE file_path = ?
                "#,
            )
            .bind(&record.error)
            .bind(record.is_directory)
            .bind(&path)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Single-statement ingestion status transition: sets the status,
    /// increments the attempt counter, records the error string (null on
    /// success) and stamps `ingested_at` iff the new status is completed.
    pub async fn update_ingestion(
        &self,
        file_path: &str,
        status: IngestionStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE manifest
            SET ingestion_status = ?,
                ingestion_attempts = COALESCE(ingestion_attempts, 0) + 1,
                ingestion_error = ?,
                ingested_at = CASE WHEN ? = 'completed' THEN CURRENT_TIMESTAMP ELSE ingested_at END
            WHERE file_path = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error)
        .bind(status.as_str())
        .bind(file_path)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch the next page of ingestion-eligible rows: discovered regular
    /// files whose ingestion status is unset, pending or failed. Ordered by
    /// path so `(batch_size, offset)` is a stable cursor.
    pub async fn fetch_pending(
        &self,
        batch_size: u32,
        offset: u64,
    ) -> Result<Vec<PendingFile>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT file_path, file_name, parent_dir, size, mtime,
                   raw_acl, acl_captured, status
            FROM manifest
            WHERE status = 'discovered'
              AND is_directory = 0
              AND (ingestion_status IS NULL
                   OR ingestion_status = 'pending'
                   OR ingestion_status = 'failed')
            ORDER BY file_path
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(batch_size as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(PendingFile {
                file_path: row.try_get("file_path")?,
                file_name: row.try_get("file_name")?,
                parent_dir: row.try_get("parent_dir")?,
                size: row.try_get("size")?,
                mtime: row.try_get("mtime")?,
                raw_acl: row.try_get("raw_acl")?,
                acl_captured: row.try_get("acl_captured")?,
                status: row.try_get("status")?,
            });
        }

        Ok(records)
    }

    /// Reset rows a forcibly-killed run left in `ingesting` back to
    /// `pending` so the next run retries them. Returns the number of rows
    /// reclaimed.
    pub async fn reset_stale_ingesting(&self) -> Result<u64, StoreError> {
        let result =
            sqlx::query("UPDATE manifest SET ingestion_status = 'pending' WHERE ingestion_status = 'ingesting'")
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Per-discovery-status counts over the whole manifest.
    pub async fn discovery_stats(&self) -> Result<ManifestCounts, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total,
                SUM(CASE WHEN status = 'discovered' THEN 1 ELSE 0 END) as discovered,
                SUM(CASE WHEN status = 'permission_denied' THEN 1 ELSE 0 END) as permission_denied,
                SUM(CASE WHEN status = 'acl_failed' THEN 1 ELSE 0 END) as acl_failed,
                SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END) as errors,
                SUM(CASE WHEN status = 'skipped' THEN 1 ELSE 0 END) as skipped,
                SUM(CASE WHEN acl_captured = 1 THEN 1 ELSE 0 END) as acl_captured
            FROM manifest
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(ManifestCounts {
            total: row.try_get::<Option<i64>, _>("total")?.unwrap_or(0),
            discovered: row.try_get::<Option<i64>, _>("discovered")?.unwrap_or(0),
            permission_denied: row
                .try_get::<Option<i64>, _>("permission_denied")?
                .unwrap_or(0),
            acl_failed: row.try_get::<Option<i64>, _>("acl_failed")?.unwrap_or(0),
            errors: row.try_get::<Option<i64>, _>("errors")?.unwrap_or(0),
            skipped: row.try_get::<Option<i64>, _>("skipped")?.unwrap_or(0),
            acl_captured: row.try_get::<Option<i64>, _>("acl_captured")?.unwrap_or(0),
        })
    }

    /// Ingestion progress counters over discovered file rows.
    pub async fn ingestion_stats(&self) -> Result<IngestionCounts, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total,
                SUM(CASE WHEN ingestion_status IS NULL OR ingestion_status = 'pending' THEN 1 ELSE 0 END) as pending,
                SUM(CASE WHEN ingestion_status = 'ingesting' THEN 1 ELSE 0 END) as ingesting,
                SUM(CASE WHEN ingestion_status = 'completed' THEN 1 ELSE 0 END) as completed,
                SUM(CASE WHEN ingestion_status = 'failed' THEN 1 ELSE 0 END) as failed
            FROM manifest
            WHERE is_directory = 0
              AND status = 'discovered'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(IngestionCounts {
            total: row.try_get::<Option<i64>, _>("total")?.unwrap_or(0),
            pending: row.try_get::<Option<i64>, _>("pending")?.unwrap_or(0),
            ingesting: row.try_get::<Option<i64>, _>("ingesting")?.unwrap_or(0),
            completed: row.try_get::<Option<i64>, _>("completed")?.unwrap_or(0),
            failed: row.try_get::<Option<i64>, _>("failed")?.unwrap_or(0),
        })
    }
}
