//! DFR Ingest - Ingestion engine entry point

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use dfr_common::logging::{init_logging, LogConfig, LogOutput};
use dfr_ingest::runner::run_ingestion;
use dfr_ingest::IngestionConfig;

/// Exit code for a user interrupt (SIGINT/SIGTERM)
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "dfr-ingest")]
#[command(author, version, about = "Upload manifest-selected files to the document service")]
struct Cli {
    /// Manifest database populated by dfr-bootstrap
    #[arg(long, env = "INGESTION_DB_PATH", default_value = "./manifest.db")]
    db_path: PathBuf,

    /// Checkpoint file for resumable runs
    #[arg(long, env = "INGESTION_CHECKPOINT_FILE", default_value = "./ingestion_checkpoint.json")]
    checkpoint_file: PathBuf,

    /// Document service host
    #[arg(long, env = "INGESTION_INGESTOR_HOST", default_value = "localhost")]
    ingestor_host: String,

    /// Document service port
    #[arg(long, env = "INGESTION_INGESTOR_PORT", default_value_t = 8082)]
    ingestor_port: u16,

    /// Target collection name
    #[arg(long, env = "INGESTION_COLLECTION_NAME", default_value = "documents")]
    collection_name: String,

    /// Embedding dimension for collection creation
    #[arg(long, env = "INGESTION_EMBEDDING_DIMENSION", default_value_t = 2048)]
    embedding_dimension: u32,

    /// Files per upload batch (1-1000)
    #[arg(long, env = "INGESTION_BATCH_SIZE", default_value_t = 100,
          value_parser = clap::value_parser!(u32).range(1..=1000))]
    batch_size: u32,

    /// Save a checkpoint every N batches
    #[arg(long, env = "INGESTION_CHECKPOINT_INTERVAL", default_value_t = 10)]
    checkpoint_interval: u64,

    /// Delay between batches in seconds
    #[arg(long, env = "INGESTION_BATCH_DELAY", default_value_t = 0.0)]
    batch_delay: f64,

    /// Maximum upload attempts per batch (1-10)
    #[arg(long, env = "INGESTION_MAX_RETRIES", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..=10))]
    max_retries: u32,

    /// Initial retry delay in seconds
    #[arg(long, env = "INGESTION_RETRY_DELAY", default_value_t = 1.0)]
    retry_delay: f64,

    /// Task polling cap in seconds
    #[arg(long, env = "INGESTION_POLL_TIMEOUT", default_value_t = 3600)]
    poll_timeout: u64,

    /// Per-request HTTP timeout in seconds
    #[arg(long, env = "INGESTION_REQUEST_TIMEOUT", default_value_t = 300)]
    request_timeout: u64,

    /// Chunk size for document splitting
    #[arg(long, env = "INGESTION_SPLIT_CHUNK_SIZE", default_value_t = 512)]
    chunk_size: u32,

    /// Chunk overlap for document splitting
    #[arg(long, env = "INGESTION_SPLIT_CHUNK_OVERLAP", default_value_t = 150)]
    chunk_overlap: u32,

    /// Don't create the collection before uploading
    #[arg(long, env = "INGESTION_NO_CREATE_COLLECTION")]
    no_create_collection: bool,

    /// Delete the collection after the run (testing aid)
    #[arg(long, env = "INGESTION_DELETE_COLLECTION")]
    delete_collection: bool,

    /// Don't pre-filter against documents already on the server
    #[arg(long, env = "INGESTION_NO_SKIP_EXISTING")]
    no_skip_existing: bool,

    /// Resume from the checkpoint file
    #[arg(long, env = "INGESTION_RESUME")]
    resume: bool,

    /// Stop on the first failing batch
    #[arg(long, env = "INGESTION_NO_CONTINUE_ON_ERROR")]
    no_continue_on_error: bool,

    /// HTTP proxy URL (e.g. http://10.10.1.10:3128)
    #[arg(long, env = "INGESTION_PROXY_HTTP")]
    proxy_http: Option<String>,

    /// HTTPS proxy URL
    #[arg(long, env = "INGESTION_PROXY_HTTPS")]
    proxy_https: Option<String>,

    /// Logging level (trace, debug, info, warn, error)
    #[arg(long, env = "INGESTION_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format: console or json
    #[arg(long, env = "INGESTION_LOG_FORMAT", default_value = "console")]
    log_format: String,

    /// Directory for rotated log files; when set, logs go to console and file
    #[arg(long, env = "INGESTION_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> IngestionConfig {
        IngestionConfig {
            db_path: self.db_path,
            checkpoint_file: self.checkpoint_file,
            ingestor_host: self.ingestor_host,
            ingestor_port: self.ingestor_port,
            collection_name: self.collection_name,
            embedding_dimension: self.embedding_dimension,
            batch_size: self.batch_size,
            checkpoint_interval: self.checkpoint_interval,
            batch_delay_seconds: self.batch_delay,
            max_retries: self.max_retries,
            retry_delay_seconds: self.retry_delay,
            poll_timeout_seconds: self.poll_timeout,
            request_timeout_seconds: self.request_timeout,
            split_chunk_size: self.chunk_size,
            split_chunk_overlap: self.chunk_overlap,
            generate_summary: true,
            blocking: false,
            skip_existing: !self.no_skip_existing,
            create_collection: !self.no_create_collection,
            delete_collection: self.delete_collection,
            resume: self.resume,
            continue_on_error: !self.no_continue_on_error,
            proxy_http: self.proxy_http,
            proxy_https: self.proxy_https,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let (Ok(level), Ok(format)) = (cli.log_level.parse(), cli.log_format.parse()) else {
        eprintln!(
            "Error: invalid log settings: level={} format={}",
            cli.log_level, cli.log_format
        );
        return ExitCode::from(1);
    };

    let mut log_config = LogConfig::default().log_file_prefix("dfr-ingest");
    log_config.level = level;
    log_config.format = format;
    if let Some(dir) = &cli.log_dir {
        log_config.output = LogOutput::Both;
        log_config.log_dir = dir.clone();
    }
    if let Err(e) = init_logging(&log_config.with_env_overrides()) {
        eprintln!("Error: failed to initialize logging: {}", e);
        return ExitCode::from(1);
    }

    let config = cli.into_config();

    let cancel = CancellationToken::new();
    let interrupted = Arc::new(AtomicBool::new(false));
    spawn_signal_listener(cancel.clone(), interrupted.clone());

    match run_ingestion(&config, cancel).await {
        Ok(stats) => {
            println!("\n{}", stats.summary());
            if interrupted.load(Ordering::SeqCst) {
                warn!("ingestion_interrupted");
                ExitCode::from(EXIT_INTERRUPTED)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(error = %e, "ingestion_failed");
            eprintln!("Error: {}", e);
            if interrupted.load(Ordering::SeqCst) {
                ExitCode::from(EXIT_INTERRUPTED)
            } else {
                ExitCode::from(1)
            }
        }
    }
}

fn spawn_signal_listener(cancel: CancellationToken, interrupted: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate => {}
        }

        warn!("shutdown_signal_received");
        interrupted.store(true, Ordering::SeqCst);
        cancel.cancel();
    });
}
