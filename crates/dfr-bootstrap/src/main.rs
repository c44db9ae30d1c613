//! DFR Bootstrap - Discovery engine entry point

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use dfr_bootstrap::acl::AclExtractorKind;
use dfr_bootstrap::runner::run_bootstrap;
use dfr_bootstrap::BootstrapConfig;
use dfr_common::logging::{init_logging, LogConfig, LogOutput};

/// Exit code for a user interrupt (SIGINT/SIGTERM)
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "dfr-bootstrap")]
#[command(author, version, about = "Populate the file manifest by walking a share")]
struct Cli {
    /// Root path of the share to scan
    #[arg(env = "BOOTSTRAP_ROOT")]
    root: PathBuf,

    /// Manifest database file path
    #[arg(long, env = "BOOTSTRAP_DB_PATH", default_value = "./manifest.db")]
    db_path: PathBuf,

    /// Concurrent workers for per-file operations (1-32)
    #[arg(long, env = "BOOTSTRAP_WORKERS", default_value_t = 8,
          value_parser = clap::value_parser!(u32).range(1..=32))]
    workers: u32,

    /// Records per batch insert (100-5000)
    #[arg(long, env = "BOOTSTRAP_BATCH_SIZE", default_value_t = 500,
          value_parser = clap::value_parser!(u32).range(100..=5000))]
    batch_size: u32,

    /// Per-file timeout in minutes (1-30)
    #[arg(long = "timeout", env = "BOOTSTRAP_FILE_TIMEOUT_MINUTES", default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..=30))]
    timeout_minutes: u64,

    /// Max retries for transient directory errors (1-10)
    #[arg(long, env = "BOOTSTRAP_MAX_RETRIES", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..=10))]
    max_retries: u32,

    /// Report progress every N records
    #[arg(long, env = "BOOTSTRAP_PROGRESS_INTERVAL", default_value_t = 10_000)]
    progress_interval: u64,

    /// SQLite page cache in MB
    #[arg(long, env = "BOOTSTRAP_SQLITE_CACHE_MB", default_value_t = 64)]
    sqlite_cache_mb: u32,

    /// ACL capture strategy
    #[arg(long, env = "BOOTSTRAP_ACL_EXTRACTOR", value_enum, default_value_t = AclExtractorKind::Getfacl)]
    acl_extractor: AclExtractorKind,

    /// Logging level (trace, debug, info, warn, error)
    #[arg(long, env = "BOOTSTRAP_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format: console or json
    #[arg(long, env = "BOOTSTRAP_LOG_FORMAT", default_value = "console")]
    log_format: String,

    /// Directory for rotated log files; when set, logs go to console and file
    #[arg(long, env = "BOOTSTRAP_LOG_DIR")]
    log_dir: Option<PathBuf>,
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

    let mut log_config = LogConfig::default().log_file_prefix("dfr-bootstrap");
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

    let config = BootstrapConfig {
        root: cli.root,
        db_path: cli.db_path,
        workers: cli.workers as usize,
        batch_size: cli.batch_size as usize,
        file_timeout_minutes: cli.timeout_minutes,
        max_retries: cli.max_retries,
        progress_interval: cli.progress_interval,
        sqlite_cache_mb: cli.sqlite_cache_mb,
        acl_extractor: cli.acl_extractor,
    };

    let cancel = CancellationToken::new();
    let interrupted = Arc::new(AtomicBool::new(false));
    spawn_signal_listener(cancel.clone(), interrupted.clone());

    match run_bootstrap(&config, cancel).await {
        Ok(stats) => {
            println!("\n{}", stats.summary());
            if interrupted.load(Ordering::SeqCst) {
                warn!("bootstrap_interrupted");
                ExitCode::from(EXIT_INTERRUPTED)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(error = %e, "bootstrap_failed");
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
