//! Ingestion engine control surface
//!
//! The same start/stop/status contract as the discovery engine, for the
//! external process-control collaborator. The collaborator must not run
//! both engines against one manifest at the same time.

use std::path::Path;

use anyhow::Context;
use uuid::Uuid;

use dfr_common::control::{EngineController, EngineStatus};
use dfr_common::error::Result as CommonResult;
use dfr_manifest::connection::connect_read_only;
use dfr_manifest::record::IngestionCounts;
use dfr_manifest::{ManifestStore, StoreError};

use crate::config::IngestionConfig;
use crate::runner::run_ingestion;

pub struct IngestionEngine {
    controller: EngineController,
}

impl IngestionEngine {
    pub fn new() -> Self {
        Self {
            controller: EngineController::new("ingestion"),
        }
    }

    /// Launch an ingestion run. Rejects when a run is already live.
    pub async fn start(&self, config: IngestionConfig) -> CommonResult<Uuid> {
        let config_json = serde_json::to_value(&config)?;
        self.controller
            .start(config_json, move |cancel| async move {
                let stats = run_ingestion(&config, cancel)
                    .await
                    .context("ingestion run failed")?;
                tracing::info!(summary = %stats.summary(), "ingestion_run_summary");
                Ok(())
            })
            .await
    }

    /// Cancel the current run, if any. Idempotent.
    pub async fn stop(&self) -> bool {
        self.controller.stop().await
    }

    pub async fn status(&self) -> EngineStatus {
        self.controller.status().await
    }

    /// Manifest-derived ingestion counters from an independent reader.
    pub async fn stats(db_path: &Path) -> Result<IngestionCounts, StoreError> {
        let pool = connect_read_only(db_path).await?;
        let counts = ManifestStore::new(pool).ingestion_stats().await?;
        Ok(counts)
    }
}

impl Default for IngestionEngine {
    fn default() -> Self {
        Self::new()
    }
}
