//! Discovery engine control surface
//!
//! Wraps a [`run_bootstrap`] invocation behind the start/stop/status
//! contract an external process-control collaborator consumes. One run at
//! a time; the caller is responsible for not running ingestion against the
//! same manifest concurrently.

use std::path::Path;

use anyhow::Context;
use uuid::Uuid;

use dfr_common::control::{EngineController, EngineStatus};
use dfr_common::error::Result as CommonResult;
use dfr_manifest::connection::connect_read_only;
use dfr_manifest::record::ManifestCounts;
use dfr_manifest::{ManifestStore, StoreError};

use crate::config::BootstrapConfig;
use crate::runner::run_bootstrap;

pub struct BootstrapEngine {
    controller: EngineController,
}

impl BootstrapEngine {
    pub fn new() -> Self {
        Self {
            controller: EngineController::new("bootstrap"),
        }
    }

    /// Launch a discovery run. Rejects when a run is already live.
    pub async fn start(&self, config: BootstrapConfig) -> CommonResult<Uuid> {
        let config_json = serde_json::to_value(&config)?;
        self.controller
            .start(config_json, move |cancel| async move {
                let stats = run_bootstrap(&config, cancel)
                    .await
                    .context("bootstrap run failed")?;
                tracing::info!(summary = %stats.summary(), "bootstrap_run_summary");
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

    /// Manifest-derived counters, readable while a run is live thanks to
    /// WAL semantics.
    pub async fn stats(db_path: &Path) -> Result<ManifestCounts, StoreError> {
        let pool = connect_read_only(db_path).await?;
        let counts = ManifestStore::new(pool).discovery_stats().await?;
        Ok(counts)
    }
}

impl Default for BootstrapEngine {
    fn default() -> Self {
        Self::new()
    }
}
