//! Ingestion run orchestration

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dfr_manifest::connection::connect;
use dfr_manifest::ManifestStore;

use crate::checkpoint::CheckpointStore;
use crate::client::DocumentClient;
use crate::config::IngestionConfig;
use crate::error::{IngestError, Result};
use crate::processor::{IngestionProcessor, IngestionStats};
use crate::repository::IngestionRepository;

/// SQLite page cache for the ingestion reader/writer pool
const SQLITE_CACHE_MB: u32 = 64;

/// Run one ingestion pass against an existing manifest. Cancellation
/// drains the current batch to a terminal status and flushes a final
/// checkpoint before returning.
pub async fn run_ingestion(
    config: &IngestionConfig,
    cancel: CancellationToken,
) -> Result<IngestionStats> {
    config.validate()?;

    if !config.db_path.exists() {
        return Err(IngestError::config(format!(
            "Manifest database not found: {}",
            config.db_path.display()
        )));
    }

    info!(
        db_path = %config.db_path.display(),
        ingestor = %config.base_url(),
        collection = %config.collection_name,
        batch_size = config.batch_size,
        "ingestion_run_starting"
    );

    let pool = connect(&config.db_path, SQLITE_CACHE_MB).await?;
    let store = ManifestStore::new(pool);
    store.init_schema().await?;
    let repository = IngestionRepository::new(store);

    // Rows left `ingesting` by a forcible kill are retried this run.
    let reclaimed = repository.reset_stale_ingesting().await?;
    if reclaimed > 0 {
        info!(reclaimed, "stale_ingesting_rows_reset");
    }

    let counts = repository.stats().await?;
    info!(
        total = counts.total,
        pending = counts.pending,
        completed = counts.completed,
        failed = counts.failed,
        "manifest_ingestion_state"
    );

    let client = DocumentClient::new(
        &config.base_url(),
        config.request_timeout(),
        config.poll_timeout(),
        config.proxy_http.as_deref(),
        config.proxy_https.as_deref(),
    )?;
    let checkpoints = CheckpointStore::new(config.checkpoint_file.clone());

    if config.create_collection {
        match client
            .create_collection(&config.collection_name, config.embedding_dimension, None)
            .await
        {
            Ok(_) => info!(collection = %config.collection_name, "collection_created"),
            Err(e) => {
                warn!(error = %e, "collection_create_failed_may_already_exist");
            }
        }
    }

    let existing_docs = if config.skip_existing {
        match client.list_documents(&config.collection_name).await {
            Ok(docs) => {
                if !docs.is_empty() {
                    info!(count = docs.len(), "existing_documents_found");
                }
                docs
            }
            Err(e) => {
                warn!(error = %e, "could_not_fetch_existing_documents");
                HashSet::new()
            }
        }
    } else {
        HashSet::new()
    };

    let (offset, batch_num) = if config.resume {
        match checkpoints.load() {
            Some(checkpoint) => {
                info!(
                    offset = checkpoint.offset,
                    batch_num = checkpoint.batch_num,
                    "resuming_from_checkpoint"
                );
                (checkpoint.offset, checkpoint.batch_num)
            }
            None => {
                warn!("no_checkpoint_found_starting_from_beginning");
                (0, 0)
            }
        }
    } else {
        (0, 0)
    };

    let processor = IngestionProcessor::new(
        repository,
        client,
        checkpoints,
        config.clone(),
        existing_docs,
    );
    let stats = processor.run(offset, batch_num, &cancel).await?;

    if config.delete_collection {
        match processor
            .client()
            .delete_collections(&[config.collection_name.clone()])
            .await
        {
            Ok(_) => info!(collection = %config.collection_name, "collection_deleted"),
            Err(e) => warn!(error = %e, "collection_delete_failed"),
        }
    }

    info!(
        completed = stats.total_completed,
        failed = stats.total_failed,
        skipped = stats.total_skipped,
        "ingestion_run_finished"
    );

    Ok(stats)
}
