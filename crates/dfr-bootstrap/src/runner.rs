//! Discovery run orchestration

use tokio_util::sync::CancellationToken;
use tracing::info;

use dfr_manifest::connection::connect;
use dfr_manifest::record::BootstrapStats;
use dfr_manifest::ManifestStore;

use crate::acl::AclExtractor;
use crate::batch::BatchProcessor;
use crate::config::BootstrapConfig;
use crate::error::Result;
use crate::walker::DirectoryWalker;

/// Run one discovery pass: walk the configured root and populate the
/// manifest. Cancelling the token stops the walk; records already buffered
/// are still flushed before returning.
pub async fn run_bootstrap(
    config: &BootstrapConfig,
    cancel: CancellationToken,
) -> Result<BootstrapStats> {
    config.validate()?;

    let pool = connect(&config.db_path, config.sqlite_cache_mb).await?;
    let store = ManifestStore::new(pool);
    store.init_schema().await?;

    info!(
        root = %config.root.display(),
        db_path = %config.db_path.display(),
        workers = config.workers,
        batch_size = config.batch_size,
        acl_extractor = ?config.acl_extractor,
        "bootstrap_started"
    );

    let extractor = AclExtractor::new(config.acl_extractor);
    let walker = DirectoryWalker::new(
        config.file_timeout(),
        config.max_retries,
        config.workers,
        extractor,
        cancel.clone(),
    );

    let records = walker.walk(&config.root).await?;
    let processor = BatchProcessor::new(store, config.batch_size, config.progress_interval);
    let stats = processor.process_stream(records).await?;

    info!(
        total_discovered = stats.total_discovered,
        total_added = stats.total_added,
        acl_captured = stats.acl_captured,
        "bootstrap_completed"
    );

    Ok(stats)
}
