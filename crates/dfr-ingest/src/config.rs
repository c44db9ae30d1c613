//! Ingestion engine configuration
//!
//! Explicit record built by the binary from CLI flags and `INGESTION_*`
//! environment variables; validated before any work starts.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Manifest database populated by the discovery engine
    pub db_path: PathBuf,
    /// Checkpoint file for resumable runs
    pub checkpoint_file: PathBuf,

    /// Document service host
    pub ingestor_host: String,
    /// Document service port
    pub ingestor_port: u16,
    /// Target collection name
    pub collection_name: String,
    /// Embedding dimension used when creating the collection
    pub embedding_dimension: u32,

    /// Files per upload batch (1-1000)
    pub batch_size: u32,
    /// Save a checkpoint every N batches
    pub checkpoint_interval: u64,
    /// Delay between batches in seconds
    pub batch_delay_seconds: f64,

    /// Maximum upload attempts per batch (1-10)
    pub max_retries: u32,
    /// Initial retry delay in seconds; doubles per attempt
    pub retry_delay_seconds: f64,

    /// Task polling cap in seconds (60-86400)
    pub poll_timeout_seconds: u64,
    /// Per-request HTTP timeout in seconds (30-1800)
    pub request_timeout_seconds: u64,

    /// Chunk size for document splitting (100-2048)
    pub split_chunk_size: u32,
    /// Chunk overlap for document splitting (0-512)
    pub split_chunk_overlap: u32,
    /// Ask the service to generate document summaries
    pub generate_summary: bool,
    /// Ask the service to process synchronously
    pub blocking: bool,

    /// Pre-filter against documents already present on the server
    pub skip_existing: bool,
    /// Create the collection if it doesn't exist
    pub create_collection: bool,
    /// Delete the collection after the run (testing aid)
    pub delete_collection: bool,
    /// Resume from the checkpoint file
    pub resume: bool,
    /// Keep going when a batch fails
    pub continue_on_error: bool,

    /// HTTP proxy URL
    pub proxy_http: Option<String>,
    /// HTTPS proxy URL
    pub proxy_https: Option<String>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./manifest.db"),
            checkpoint_file: PathBuf::from("./ingestion_checkpoint.json"),
            ingestor_host: "localhost".to_string(),
            ingestor_port: 8082,
            collection_name: "documents".to_string(),
            embedding_dimension: 2048,
            batch_size: 100,
            checkpoint_interval: 10,
            batch_delay_seconds: 0.0,
            max_retries: 3,
            retry_delay_seconds: 1.0,
            poll_timeout_seconds: 3600,
            request_timeout_seconds: 300,
            split_chunk_size: 512,
            split_chunk_overlap: 150,
            generate_summary: true,
            blocking: false,
            skip_existing: true,
            create_collection: true,
            delete_collection: false,
            resume: false,
            continue_on_error: true,
            proxy_http: None,
            proxy_https: None,
        }
    }
}

impl IngestionConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ingestor_host, self.ingestor_port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_seconds)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=1000).contains(&self.batch_size) {
            return Err(IngestError::config(format!(
                "batch_size must be between 1 and 1000, got {}",
                self.batch_size
            )));
        }
        if self.checkpoint_interval == 0 {
            return Err(IngestError::config("checkpoint_interval must be positive"));
        }
        if !(1..=10).contains(&self.max_retries) {
            return Err(IngestError::config(format!(
                "max_retries must be between 1 and 10, got {}",
                self.max_retries
            )));
        }
        if self.retry_delay_seconds < 0.1 {
            return Err(IngestError::config(
                "retry_delay must be at least 0.1 seconds",
            ));
        }
        if self.batch_delay_seconds < 0.0 {
            return Err(IngestError::config("batch_delay cannot be negative"));
        }
        if !(60..=86_400).contains(&self.poll_timeout_seconds) {
            return Err(IngestError::config(format!(
                "poll_timeout must be between 60 and 86400 seconds, got {}",
                self.poll_timeout_seconds
            )));
        }
        if !(30..=1800).contains(&self.request_timeout_seconds) {
            return Err(IngestError::config(format!(
                "request_timeout must be between 30 and 1800 seconds, got {}",
                self.request_timeout_seconds
            )));
        }
        if !(100..=2048).contains(&self.split_chunk_size) {
            return Err(IngestError::config(format!(
                "split_chunk_size must be between 100 and 2048, got {}",
                self.split_chunk_size
            )));
        }
        if self.split_chunk_overlap > 512 {
            return Err(IngestError::config(format!(
                "split_chunk_overlap must be at most 512, got {}",
                self.split_chunk_overlap
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(IngestionConfig::default().validate().is_ok());
    }

    #[test]
    fn base_url_combines_host_and_port() {
        let mut config = IngestionConfig::default();
        config.ingestor_host = "rag.internal".to_string();
        config.ingestor_port = 9000;
        assert_eq!(config.base_url(), "http://rag.internal:9000");
    }

    #[test]
    fn out_of_range_knobs_rejected() {
        let mut config = IngestionConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = IngestionConfig::default();
        config.poll_timeout_seconds = 10;
        assert!(config.validate().is_err());

        let mut config = IngestionConfig::default();
        config.split_chunk_overlap = 1024;
        assert!(config.validate().is_err());
    }
}
