//! Error types for the discovery engine

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bootstrap operations
pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Fatal discovery failures. Per-entry problems never surface here; they
/// become manifest records instead.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Root path not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Root directory not readable: {0}")]
    RootUnreadable(PathBuf),

    #[error("Manifest error: {0}")]
    Store(#[from] dfr_manifest::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BootstrapError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
