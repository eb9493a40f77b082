//! reelsync: watches a recordings folder and uploads finished videos.
//!
//! Configuration comes from the environment (see `MonitorConfig::from_env`);
//! the flags below override the watched and store locations.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use reelsync_cli::{log_error, render_table, StatusReport};
use reelsync_core::config::default_db_path;
use reelsync_core::{AppError, MonitorConfig};
use reelsync_db::RecordRepository;
use reelsync_infra::{init_telemetry, shutdown_signal, shutdown_telemetry, LogFormat};
use reelsync_storage::{create_uploader, TracingProgress};
use reelsync_worker::Monitor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

#[derive(Parser)]
#[command(name = "reelsync", about = "Upload finished recordings from a watched folder")]
struct Cli {
    /// Directory to watch (overrides REELSYNC_WATCH_DIR)
    #[arg(long, global = true)]
    watch_dir: Option<PathBuf>,

    /// Record store location (overrides REELSYNC_DB_PATH)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Log output: pretty or json
    #[arg(long, global = true, env = "REELSYNC_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the watched folder until interrupted (default)
    Run,
    /// Run a single tick and exit
    Once,
    /// Print every record and per-status counts
    Status {
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn load_config(cli: &Cli) -> anyhow::Result<MonitorConfig> {
    let mut config = MonitorConfig::from_env().context("Failed to load configuration")?;

    if let Some(dir) = &cli.watch_dir {
        config.watch_dir = dir.clone();
        if cli.db_path.is_none() && std::env::var_os("REELSYNC_DB_PATH").is_none() {
            config.db_path = default_db_path(dir);
        }
    }
    if let Some(path) = &cli.db_path {
        config.db_path = path.clone();
    }
    Ok(config)
}

async fn build_monitor(config: &MonitorConfig) -> Result<Monitor, AppError> {
    config
        .validate()
        .map_err(|e| AppError::Config(format!("{:#}", e)))?;

    let repo = RecordRepository::connect(&config.db_path).await?;
    let uploader = create_uploader(config, Arc::new(TracingProgress::default())).await?;

    Ok(Monitor::new(
        config,
        repo,
        uploader,
        Arc::new(Mutex::new(())),
    ))
}

async fn start(config: &MonitorConfig) -> anyhow::Result<Monitor> {
    build_monitor(config).await.map_err(|e| {
        log_error(&e);
        anyhow::Error::new(e)
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry("info,sqlx=warn", cli.log_format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let monitor = start(&config).await?;
            let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
            tokio::spawn(async move {
                shutdown_signal().await;
                let _ = shutdown_tx.send(()).await;
            });
            monitor.run_forever(shutdown_rx).await;
        }
        Commands::Once => {
            let monitor = start(&config).await?;
            let summary = monitor.tick().await?;
            tracing::debug!(?summary, "Single tick finished");
        }
        Commands::Status { format } => {
            let repo = RecordRepository::connect(&config.db_path)
                .await
                .with_context(|| {
                    format!("Failed to open record store {}", config.db_path.display())
                })?;
            let report = StatusReport {
                records: repo.list_all().await?,
                counts: repo.count_by_status().await?,
            };
            match format {
                OutputFormat::Table => print!("{}", render_table(&report)),
                OutputFormat::Json => {
                    let out =
                        serde_json::to_string_pretty(&report).context("Serialize status report")?;
                    println!("{}", out);
                }
            }
        }
    }

    shutdown_telemetry().await;
    Ok(())
}
