//! Ingestion state machine
//!
//! Drains pending manifest rows in path order: skip what the server already
//! holds, fail what is gone from disk, upload the rest with bounded retry,
//! poll the asynchronous task, and write every outcome back into the
//! manifest. The offset cursor is checkpointed every N batches and once
//! more at the end — including on cancellation — so a restart with
//! `--resume` picks up where the run stopped.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use dfr_manifest::record::{IngestionStatus, PendingFile};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::client::{ClientError, DocumentClient, SplitOptions, UploadPayload, UploadResponse};
use crate::config::IngestionConfig;
use crate::error::Result;
use crate::repository::IngestionRepository;

/// Aggregate result of one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct IngestionStats {
    pub total_processed: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_skipped: u64,
    pub batch_count: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl IngestionStats {
    pub fn new() -> Self {
        Self {
            total_processed: 0,
            total_completed: 0,
            total_failed: 0,
            total_skipped: 0,
            batch_count: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total_completed + self.total_failed;
        if total == 0 {
            return 0.0;
        }
        (self.total_completed as f64 / total as f64) * 100.0
    }

    /// Human-readable end-of-run block
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Ingestion complete".to_string(),
            format!("  Total processed: {}", self.total_processed),
            format!("  Completed: {}", self.total_completed),
            format!("  Skipped (already ingested): {}", self.total_skipped),
            format!("  Failed: {}", self.total_failed),
            format!("  Success rate: {:.1}%", self.success_rate()),
            format!("  Batches: {}", self.batch_count),
            format!("  Duration: {:.1}s", self.duration_seconds()),
        ];
        let duration = self.duration_seconds();
        if duration > 0.0 {
            lines.push(format!(
                "  Files/second: {:.1}",
                self.total_processed as f64 / duration
            ));
        }
        lines.join("\n")
    }
}

impl Default for IngestionStats {
    fn default() -> Self {
        Self::new()
    }
}

pub struct IngestionProcessor {
    repository: IngestionRepository,
    client: DocumentClient,
    checkpoints: CheckpointStore,
    config: IngestionConfig,
    /// Document names the server already holds; these rows complete via
    /// the skip path without an upload
    existing_docs: HashSet<String>,
}

impl IngestionProcessor {
    pub fn new(
        repository: IngestionRepository,
        client: DocumentClient,
        checkpoints: CheckpointStore,
        config: IngestionConfig,
        existing_docs: HashSet<String>,
    ) -> Self {
        Self {
            repository,
            client,
            checkpoints,
            config,
            existing_docs,
        }
    }

    pub fn client(&self) -> &DocumentClient {
        &self.client
    }

    /// Run the outer loop from `(offset, batch_num)` until the pending
    /// query drains, a failing batch stops the run, or the token cancels.
    /// A final checkpoint is written on every exit path.
    pub async fn run(
        &self,
        offset: u64,
        batch_num: u64,
        cancel: &CancellationToken,
    ) -> Result<IngestionStats> {
        let mut stats = IngestionStats::new();
        let mut current_offset = offset;
        let mut current_batch = batch_num;

        info!(
            offset,
            batch_num,
            batch_size = self.config.batch_size,
            checkpoint_interval = self.config.checkpoint_interval,
            "ingestion_started"
        );
        if !self.existing_docs.is_empty() {
            info!(
                count = self.existing_docs.len(),
                "server_side_documents_to_skip"
            );
        }

        loop {
            if cancel.is_cancelled() {
                warn!("ingestion_interrupted");
                break;
            }

            let files = self
                .repository
                .fetch_pending(self.config.batch_size, current_offset)
                .await?;
            if files.is_empty() {
                info!("no_more_pending_files");
                break;
            }

            current_batch += 1;
            stats.batch_count += 1;

            let (successful, failed) = self
                .process_batch(&files, current_batch, &mut stats)
                .await?;

            stats.total_completed += successful.len() as u64;
            stats.total_failed += failed.len() as u64;
            stats.total_processed += files.len() as u64;
            current_offset += files.len() as u64;

            if current_batch % self.config.checkpoint_interval == 0 {
                self.save_checkpoint(current_offset, current_batch, &stats)?;
                info!(
                    processed = stats.total_processed,
                    failed = stats.total_failed,
                    skipped = stats.total_skipped,
                    success_rate = %format!("{:.1}", stats.success_rate()),
                    "checkpoint_saved"
                );
            }

            if self.config.batch_delay_seconds > 0.0 {
                let delay = Duration::from_secs_f64(self.config.batch_delay_seconds);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {}
                }
            }

            if !failed.is_empty() && !self.config.continue_on_error {
                error!("stopping_on_batch_failure");
                break;
            }
        }

        // Final checkpoint on every exit path, interrupt included; after a
        // clean run a subsequent --resume is a no-op.
        self.save_checkpoint(current_offset, current_batch, &stats)?;

        stats.finished_at = Some(Utc::now());
        Ok(stats)
    }

    /// Process one batch. Returns `(successful_paths, failed_paths)`;
    /// only manifest/database failures escape as errors.
    async fn process_batch(
        &self,
        files: &[PendingFile],
        batch_num: u64,
        stats: &mut IngestionStats,
    ) -> Result<(Vec<String>, Vec<(String, String)>)> {
        info!(batch = batch_num, files = files.len(), "processing_batch");

        let mut successful = Vec::new();
        let mut failed = Vec::new();

        // Server-side dedup: anything already present completes locally.
        let mut to_upload = Vec::new();
        for file in files {
            if self.existing_docs.contains(&file.file_name) {
                debug!(file = %file.file_name, "skipping_already_ingested");
                self.repository
                    .update_ingestion(&file.file_path, IngestionStatus::Completed, None)
                    .await?;
                stats.total_skipped += 1;
                successful.push(file.file_path.clone());
            } else {
                to_upload.push(file);
            }
        }

        if to_upload.is_empty() {
            info!(batch = batch_num, "all_files_already_ingested");
            return Ok((successful, failed));
        }

        for file in &to_upload {
            self.repository
                .update_ingestion(&file.file_path, IngestionStatus::Ingesting, None)
                .await?;
        }

        // Rows can outlive their files on a live share.
        let mut upload_files = Vec::new();
        for file in to_upload {
            if self.repository.file_exists(&file.file_path).await {
                upload_files.push(file);
            } else {
                warn!(path = %file.file_path, "file_not_found_on_disk");
                self.repository
                    .update_ingestion(
                        &file.file_path,
                        IngestionStatus::Failed,
                        Some("File not found on disk"),
                    )
                    .await?;
                failed.push((file.file_path.clone(), "File not found".to_string()));
            }
        }

        if upload_files.is_empty() {
            warn!(batch = batch_num, "no_existing_files_to_upload");
            return Ok((successful, failed));
        }

        let payload = self.build_payload(&upload_files);
        let paths: Vec<PathBuf> = upload_files
            .iter()
            .map(|f| PathBuf::from(&f.file_path))
            .collect();

        let outcome = match self.upload_with_retry(&paths, &payload).await {
            Ok(UploadResponse {
                task_id: Some(task_id),
            }) => self.client.poll_task(&task_id).await.map(|_| ()),
            Ok(UploadResponse { task_id: None }) => Ok(()),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                for file in &upload_files {
                    self.repository
                        .update_ingestion(&file.file_path, IngestionStatus::Completed, None)
                        .await?;
                    successful.push(file.file_path.clone());
                }
                info!(batch = batch_num, uploaded = upload_files.len(), "batch_uploaded");
            }
            Err(e) => {
                error!(batch = batch_num, error = %e, "batch_upload_failed");
                let message = e.to_string();
                for file in &upload_files {
                    self.repository
                        .update_ingestion(
                            &file.file_path,
                            IngestionStatus::Failed,
                            Some(&message),
                        )
                        .await?;
                    failed.push((file.file_path.clone(), message.clone()));
                }
            }
        }

        Ok((successful, failed))
    }

    /// Upload one batch with `retry_delay * 2^attempt` backoff.
    async fn upload_with_retry(
        &self,
        paths: &[PathBuf],
        payload: &UploadPayload,
    ) -> std::result::Result<UploadResponse, ClientError> {
        let mut last_error = String::new();

        for attempt in 0..self.config.max_retries {
            match self.client.upload_documents(paths, payload).await {
                Ok(response) => {
                    debug!(attempts = attempt + 1, "upload_succeeded");
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        error = %e,
                        "upload_attempt_failed"
                    );
                    last_error = e.to_string();

                    if attempt + 1 < self.config.max_retries {
                        let delay = Duration::from_secs_f64(
                            self.config.retry_delay_seconds * (1u64 << attempt) as f64,
                        );
                        debug!(delay_seconds = delay.as_secs_f64(), "retrying_upload");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(ClientError::UploadRetriesExceeded {
            attempts: self.config.max_retries,
            last_error,
        })
    }

    /// Per-file custom metadata: the row's `raw_acl` when it parses as a
    /// JSON object, `{"acl": <raw>}` otherwise, `{}` when absent.
    fn build_payload(&self, files: &[&PendingFile]) -> UploadPayload {
        let custom_metadata = files
            .iter()
            .map(|file| match file.raw_acl.as_deref() {
                Some(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
                    Ok(value @ serde_json::Value::Object(_)) => value,
                    _ => serde_json::json!({"acl": raw}),
                },
                None => serde_json::json!({}),
            })
            .collect();

        UploadPayload {
            collection_name: self.config.collection_name.clone(),
            blocking: self.config.blocking,
            split_options: SplitOptions {
                chunk_size: self.config.split_chunk_size,
                chunk_overlap: self.config.split_chunk_overlap,
            },
            custom_metadata,
            generate_summary: self.config.generate_summary,
        }
    }

    fn save_checkpoint(&self, offset: u64, batch_num: u64, stats: &IngestionStats) -> Result<()> {
        self.checkpoints.save(&Checkpoint::new(
            offset,
            batch_num,
            stats.total_processed,
            stats.total_failed,
        ))
    }
}
