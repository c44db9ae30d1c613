//! Ingestion view over the manifest
//!
//! A narrow interface for the ingestion pipeline: the pending cursor,
//! status writebacks, progress counters and a local-disk existence check.
//! `fetch_pending` orders by path, so `(batch_size, offset)` stays a stable
//! cursor across a run even while rows are inserted concurrently.

use std::path::Path;

use dfr_manifest::record::{IngestionCounts, IngestionStatus, PendingFile};
use dfr_manifest::{ManifestStore, StoreError};

#[derive(Clone)]
pub struct IngestionRepository {
    store: ManifestStore,
}

impl IngestionRepository {
    pub fn new(store: ManifestStore) -> Self {
        Self { store }
    }

    pub async fn fetch_pending(
        &self,
        batch_size: u32,
        offset: u64,
    ) -> Result<Vec<PendingFile>, StoreError> {
        self.store.fetch_pending(batch_size, offset).await
    }

    pub async fn update_ingestion(
        &self,
        file_path: &str,
        status: IngestionStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.store.update_ingestion(file_path, status, error).await
    }

    pub async fn stats(&self) -> Result<IngestionCounts, StoreError> {
        self.store.ingestion_stats().await
    }

    /// Reclaim rows a forcibly-killed run left in `ingesting`.
    pub async fn reset_stale_ingesting(&self) -> Result<u64, StoreError> {
        self.store.reset_stale_ingesting().await
    }

    /// Filesystem check, not a manifest query: is the file still on disk?
    pub async fn file_exists(&self, file_path: &str) -> bool {
        tokio::fs::try_exists(Path::new(file_path))
            .await
            .unwrap_or(false)
    }
}
