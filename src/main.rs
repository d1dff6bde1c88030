//! # PostPilot Worker
//!
//! Process shell around the scheduler engine: wires config → stores →
//! adapter registry → engine + DM dispatcher, starts polling, and turns
//! ctrl-c into a graceful drain. All the actual behavior lives in the
//! library crates.
//!
//! Usage:
//!   postpilot                          # Run with ~/.postpilot/config.toml
//!   postpilot --config ./pp.toml       # Custom config
//!   postpilot --poll-interval-ms 5000  # Override the poll cadence

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use postpilot_adapters::{AdapterRegistry, WebhookAdapter, WebhookAdapterConfig};
use postpilot_campaigns::{DmDispatcher, SqliteCampaignStore};
use postpilot_core::EngineConfig;
use postpilot_scheduler::{SchedulerEngine, SqliteTaskStore};

#[derive(Parser)]
#[command(
    name = "postpilot",
    version,
    about = "🛫 PostPilot — scheduled-task worker for creator operations"
)]
struct Cli {
    /// Config file path (default: ~/.postpilot/config.toml)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Data directory for the SQLite databases (overrides config)
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,

    /// Poll interval in milliseconds (overrides config)
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Skip the startup sweep over stale in-progress tasks
    #[arg(long)]
    no_recover: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "postpilot=debug,postpilot_scheduler=debug,postpilot_campaigns=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => EngineConfig::load_from(path)?,
        None => EngineConfig::load()?,
    };
    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| config.storage.data_dir.clone());
    std::fs::create_dir_all(&data_dir)?;

    // Stores
    let task_store = Arc::new(SqliteTaskStore::open(&data_dir.join("postpilot.db"))?);
    let campaign_store = Arc::new(SqliteCampaignStore::open(&data_dir.join("campaigns.db"))?);

    // Adapters: the generic relay adapter, bound per config. Concrete
    // platform adapters register here the same way.
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(WebhookAdapter::new(WebhookAdapterConfig {
        kind: "webhook".into(),
        endpoint: std::env::var("POSTPILOT_RELAY_URL")
            .unwrap_or_else(|_| "http://localhost:8787/relay".into()),
        auth_header: "Authorization".into(),
        auth_value: std::env::var("POSTPILOT_RELAY_TOKEN").unwrap_or_default(),
        timeout_secs: 10,
    })));
    let registry = Arc::new(registry);

    let engine = Arc::new(SchedulerEngine::new(
        task_store,
        registry.clone(),
        config.scheduler.clone(),
    ));
    let _dispatcher = DmDispatcher::new(campaign_store, registry);

    // Log every engine event — the worker's one event subscriber
    let mut events = engine.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::debug!("📣 [{}] {:?}", event.name(), event);
        }
    });

    if !cli.no_recover {
        let recovered = engine.recover_stale().await?;
        if recovered > 0 {
            tracing::info!("🧹 Recovered {recovered} stale in-progress tasks");
        }
    }

    let interval_ms = cli
        .poll_interval_ms
        .unwrap_or(config.scheduler.poll_interval_ms);
    engine.clone().start_polling(interval_ms).await;

    tokio::signal::ctrl_c().await?;
    tracing::info!("🛑 Shutting down...");
    engine.shutdown().await;
    Ok(())
}
