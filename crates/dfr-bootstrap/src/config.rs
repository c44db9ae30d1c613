//! Discovery engine configuration
//!
//! An explicit record with validation at construction; binaries build it
//! from CLI flags and `BOOTSTRAP_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::acl::AclExtractorKind;
use crate::error::{BootstrapError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Root path of the share to scan
    pub root: PathBuf,
    /// Manifest database file
    pub db_path: PathBuf,
    /// Concurrent workers for per-file stat/ACL operations (1-32)
    pub workers: usize,
    /// Records per batch insert (100-5000)
    pub batch_size: usize,
    /// Per-file operation timeout in minutes (1-30)
    pub file_timeout_minutes: u64,
    /// Max retries for transient directory read errors (1-10)
    pub max_retries: u32,
    /// Emit a progress event every N records
    pub progress_interval: u64,
    /// SQLite page cache in MB
    pub sqlite_cache_mb: u32,
    /// Permission capture strategy
    pub acl_extractor: AclExtractorKind,
}

impl BootstrapConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            db_path: PathBuf::from("./manifest.db"),
            workers: 8,
            batch_size: 500,
            file_timeout_minutes: 5,
            max_retries: 3,
            progress_interval: 10_000,
            sqlite_cache_mb: 64,
            acl_extractor: AclExtractorKind::Getfacl,
        }
    }

    pub fn file_timeout(&self) -> Duration {
        Duration::from_secs(self.file_timeout_minutes * 60)
    }

    /// Range checks; fatal before any work starts.
    pub fn validate(&self) -> Result<()> {
        if !(1..=32).contains(&self.workers) {
            return Err(BootstrapError::config(format!(
                "workers must be between 1 and 32, got {}",
                self.workers
            )));
        }
        if !(100..=5000).contains(&self.batch_size) {
            return Err(BootstrapError::config(format!(
                "batch_size must be between 100 and 5000, got {}",
                self.batch_size
            )));
        }
        if !(1..=30).contains(&self.file_timeout_minutes) {
            return Err(BootstrapError::config(format!(
                "file timeout must be between 1 and 30 minutes, got {}",
                self.file_timeout_minutes
            )));
        }
        if !(1..=10).contains(&self.max_retries) {
            return Err(BootstrapError::config(format!(
                "max_retries must be between 1 and 10, got {}",
                self.max_retries
            )));
        }
        if self.progress_interval == 0 {
            return Err(BootstrapError::config("progress_interval must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(BootstrapConfig::new("/tmp").validate().is_ok());
    }

    #[test]
    fn out_of_range_workers_rejected() {
        let mut config = BootstrapConfig::new("/tmp");
        config.workers = 0;
        assert!(config.validate().is_err());
        config.workers = 33;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_batch_size_rejected() {
        let mut config = BootstrapConfig::new("/tmp");
        config.batch_size = 50;
        assert!(config.validate().is_err());
    }
}
