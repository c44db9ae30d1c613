//! Batch processor
//!
//! Consumes the walker's record stream, classifies each record into run
//! counters, and flushes full batches to the manifest store. Flushes run on
//! a background task so the walker never waits on disk I/O; at most one
//! flush is in flight, and a flush failure aborts the run — silently
//! dropping records would corrupt ingestion semantics downstream.

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{error, info};

use dfr_manifest::record::{BootstrapStats, DiscoveryStatus, FileRecord};
use dfr_manifest::{ManifestStore, StoreError};

use crate::error::{BootstrapError, Result};

pub struct BatchProcessor {
    store: ManifestStore,
    batch_size: usize,
    progress_interval: u64,
}

impl BatchProcessor {
    pub fn new(store: ManifestStore, batch_size: usize, progress_interval: u64) -> Self {
        Self {
            store,
            batch_size,
            progress_interval: progress_interval.max(1),
        }
    }

    /// Drain the stream to completion, returning aggregate run statistics.
    pub async fn process_stream(
        &self,
        mut records: impl Stream<Item = FileRecord> + Unpin,
    ) -> Result<BootstrapStats> {
        let mut stats = BootstrapStats::new();
        let mut batch: Vec<FileRecord> = Vec::with_capacity(self.batch_size);
        let mut inflight: Option<JoinHandle<std::result::Result<(u64, u64), StoreError>>> = None;

        info!(
            batch_size = self.batch_size,
            progress_interval = self.progress_interval,
            "batch_processing_started"
        );

        while let Some(record) = records.next().await {
            classify(&mut stats, &record);
            batch.push(record);

            if batch.len() >= self.batch_size {
                if let Some(handle) = inflight.take() {
                    let (inserted, skipped) = settle(handle).await?;
                    stats.total_added += inserted;
                    stats.total_skipped += skipped;
                }

                let store = self.store.clone();
                let to_write = std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
                inflight = Some(tokio::spawn(async move {
                    store.bulk_upsert(&to_write).await
                }));
            }

            if stats.total_discovered % self.progress_interval == 0 {
                report_progress(&stats);
            }
        }

        if let Some(handle) = inflight.take() {
            let (inserted, skipped) = settle(handle).await?;
            stats.total_added += inserted;
            stats.total_skipped += skipped;
        }

        if !batch.is_empty() {
            let (inserted, skipped) = self.store.bulk_upsert(&batch).await.map_err(flush_error)?;
            stats.total_added += inserted;
            stats.total_skipped += skipped;
        }

        stats.finished_at = Some(chrono::Utc::now());
        Ok(stats)
    }
}

fn classify(stats: &mut BootstrapStats, record: &FileRecord) {
    stats.total_discovered += 1;
    match record.status {
        DiscoveryStatus::PermissionDenied => stats.permission_errors += 1,
        DiscoveryStatus::Error | DiscoveryStatus::Skipped => stats.other_errors += 1,
        _ if record.acl_captured => stats.acl_captured += 1,
        _ => stats.acl_failed += 1,
    }
}

async fn settle(
    handle: JoinHandle<std::result::Result<(u64, u64), StoreError>>,
) -> Result<(u64, u64)> {
    match handle.await {
        Ok(Ok(counts)) => Ok(counts),
        Ok(Err(e)) => Err(flush_error(e)),
        Err(e) => Err(BootstrapError::Internal(format!(
            "batch flush task panicked: {}",
            e
        ))),
    }
}

fn flush_error(e: StoreError) -> BootstrapError {
    error!(
        error = %e,
        likely_cause = "Database write failure - disk full or locked",
        developer_action = "Check disk space, DB permissions, and file locks",
        "batch_flush_error"
    );
    BootstrapError::Store(e)
}

fn report_progress(stats: &BootstrapStats) {
    info!(
        total_discovered = stats.total_discovered,
        total_added = stats.total_added,
        total_skipped = stats.total_skipped,
        permission_errors = stats.permission_errors,
        acl_captured = stats.acl_captured,
        acl_failed = stats.acl_failed,
        duration_seconds = %format!("{:.1}", stats.duration_seconds()),
        records_per_second = %format!("{:.1}", stats.records_per_second()),
        "progress_report"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn classification_buckets_by_status() {
        let mut stats = BootstrapStats::new();

        let mut discovered = FileRecord::skipped(Path::new("/s/a.txt"), "");
        discovered.status = DiscoveryStatus::Discovered;
        discovered.acl_captured = true;
        classify(&mut stats, &discovered);

        let mut acl_failed = FileRecord::skipped(Path::new("/s/b.txt"), "");
        acl_failed.status = DiscoveryStatus::AclFailed;
        classify(&mut stats, &acl_failed);

        classify(
            &mut stats,
            &FileRecord::permission_denied(Path::new("/s/c.txt"), false, "denied"),
        );
        classify(
            &mut stats,
            &FileRecord::skipped(Path::new("/s/link"), "Symlink skipped"),
        );
        classify(&mut stats, &FileRecord::errored(Path::new("/s/hung"), "timeout"));

        assert_eq!(stats.total_discovered, 5);
        assert_eq!(stats.acl_captured, 1);
        assert_eq!(stats.acl_failed, 1);
        assert_eq!(stats.permission_errors, 1);
        assert_eq!(stats.other_errors, 2);
    }
}
