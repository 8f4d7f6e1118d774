//! Order book microservice: process entry point.
//!
//! Startup sequence: load and validate configuration, replay the WAL to
//! rebuild book state, reopen the WAL at the recovered LSN, wire the
//! event publisher and command consumer around the recovered book, then
//! run until a shutdown signal arrives.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{generate_default_config, load_config, save_config, validate_config, MasterConfig};
use matching_engine::{
    CommandConsumer, EventPublisher, MatchingEngine, PipelineMetrics, RecoveryManager, ShutdownController, Wal,
};
use observability::{init_logging, LogFormat};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storage::PostgresStore;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "obm")]
#[command(about = "Order book microservice: single-instrument price-time-priority matching")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the service with the given configuration
    Start {
        #[arg(short, long, default_value = "config/obm.yaml")]
        config: PathBuf,
    },
    /// Validate configuration without starting the service
    Validate {
        #[arg(short, long, default_value = "config/obm.yaml")]
        config: PathBuf,
    },
    /// Write a new configuration file populated with defaults
    Init {
        #[arg(short, long, default_value = "config/obm.yaml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging("obm", LogFormat::Pretty)?;

    let cli = Cli::parse();
    match cli.command {
        Commands::Start { config } => start(&config).await,
        Commands::Validate { config } => validate(&config),
        Commands::Init { output } => init(&output),
    }
}

fn validate(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let report = validate_config(&config);

    for default in &report.defaults_applied {
        println!("[default] {} = {}", default.field, default.value);
    }
    for warning in &report.warnings {
        println!("[warn] {}: {}", warning.field, warning.message);
    }
    for err in &report.errors {
        println!("[error] {err}");
    }

    if !report.is_valid() {
        anyhow::bail!("configuration validation failed with {} error(s)", report.errors.len());
    }
    println!("configuration is valid");
    Ok(())
}

fn init(output_path: &Path) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory for {output_path:?}"))?;
    }
    save_config(&generate_default_config(), output_path)?;
    println!("wrote default configuration to {output_path:?}");
    Ok(())
}

async fn start(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let report = validate_config(&config);
    for warning in &report.warnings {
        warn!(field = %warning.field, message = %warning.message, "configuration warning");
    }
    if !report.is_valid() {
        for err in &report.errors {
            error!("{err}");
        }
        anyhow::bail!("cannot start with an invalid configuration");
    }

    run(config).await
}

async fn run(config: MasterConfig) -> Result<()> {
    info!(wal_path = %config.wal_file_path, "recovering order book from WAL");
    let recovered = RecoveryManager::recover(&config.wal_file_path)?;
    info!(
        orders_in_book = recovered.book.order_count(),
        trades_recovered = recovered.trades.len(),
        last_lsn = recovered.last_lsn,
        "recovery complete"
    );

    let engine = Arc::new(Mutex::new(MatchingEngine::from_book(recovered.book)));
    let wal = Wal::open(&config.wal_file_path).context("opening WAL for writing")?;
    let publisher = Arc::new(EventPublisher::new());
    let metrics = Arc::new(PipelineMetrics::new());

    let storage: Option<Arc<dyn storage::OrderStore>> = match &config.database_url {
        Some(url) => match PostgresStore::connect(url).await {
            Ok(store) => Some(Arc::new(store) as Arc<dyn storage::OrderStore>),
            Err(e) => {
                warn!("could not connect to query-side database, continuing without it: {e}");
                None
            }
        },
        None => {
            info!("no database_url configured; query-side persistence disabled");
            None
        }
    };

    let mut consumer = CommandConsumer::connect(
        &config.queue_url,
        config.order_queue_name.clone(),
        config.consumer_group.clone(),
        config.consumer_name.clone(),
        engine.clone(),
        wal,
        publisher.clone(),
        storage,
        metrics,
    )
    .await
    .context("connecting command consumer to queue")?;
    consumer.ensure_consumer_group().await?;

    let shutdown = ShutdownController::new();
    let snapshot_shutdown = shutdown.child_token();
    let consumer_shutdown = shutdown.child_token();

    let snapshot_task = tokio::spawn(publisher.run_snapshot_pump(
        engine,
        config.snapshot_interval_seconds,
        config.snapshot_depth,
        snapshot_shutdown,
    ));

    let consumer_task = tokio::spawn(async move {
        consumer.run(consumer_shutdown).await;
    });

    shutdown.wait_for_shutdown_signal().await;

    consumer_task.await.context("command consumer task panicked")?;
    snapshot_task.await.context("snapshot pump task panicked")?;

    info!("obm shut down cleanly");
    Ok(())
}
