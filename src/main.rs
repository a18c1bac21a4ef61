//! mqtt-http-bridge - Main Entry Point
//!
//! Listens on the configured MQTT brokers and forwards matching messages to
//! HTTP webhooks. Subscriptions are managed through the HTTP API.

use clap::{Parser, Subcommand};
use mqtt_http_bridge::api;
use mqtt_http_bridge::bootstrap::populate_data_store;
use mqtt_http_bridge::config::{BridgeConfig, StorageDriver};
use mqtt_http_bridge::expression::ExpressionCache;
use mqtt_http_bridge::message_log::MessageLog;
use mqtt_http_bridge::observability::init_default_logging;
use mqtt_http_bridge::processor::Processor;
use mqtt_http_bridge::publisher::HttpPublisher;
use mqtt_http_bridge::store::{FileStore, MemoryStore, Store};
use mqtt_http_bridge::subscription::SubscriptionService;
use mqtt_http_bridge::template::TemplateCache;
use mqtt_http_bridge::transport::mqtt::spawn_listeners;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["bridge.toml", "config/bridge.toml"];

/// Forward MQTT messages to HTTP webhooks
#[derive(Parser)]
#[command(name = "mqtt-http-bridge")]
#[command(about = "Forward MQTT messages to HTTP webhooks through templated subscriptions")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "CONFIG_FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge (default)
    Run,
    /// Validate the configuration
    Config {
        /// Print the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting mqtt-http-bridge v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_bridge(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: Option<&PathBuf>,
) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(BridgeConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(BridgeConfig::load_from_file(&path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create bridge.toml".into())
}

/// Open the configured store; the file store also gets its reload task
async fn build_store(
    config: &BridgeConfig,
    shutdown: &watch::Receiver<bool>,
) -> Result<(Arc<dyn Store>, Option<JoinHandle<()>>), Box<dyn std::error::Error>> {
    match config.storage.driver {
        StorageDriver::Memory => {
            info!("Using in-memory store");
            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            Ok((store, None))
        }
        StorageDriver::File => {
            let store = FileStore::open(&config.storage.file).await?;
            let reload = store.spawn_reload(config.storage.reload_interval(), shutdown.clone());
            let store: Arc<dyn Store> = store;
            Ok((store, Some(reload)))
        }
    }
}

async fn run_bridge(config: BridgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (store, reload_task) = build_store(&config, &shutdown_rx).await?;
    let service = Arc::new(SubscriptionService::new(
        store,
        Arc::new(TemplateCache::new()),
    ));

    if config.is_development() && config.app.prepare_data {
        let seeded = populate_data_store(&service).await?;
        info!(subscription_id = %seeded.id, "Development data prepared");
    } else if config.app.prepare_data {
        warn!("prepare_data is ignored outside the dev environment");
    }

    let publisher = Arc::new(HttpPublisher::start(&config.publisher, shutdown_rx.clone())?);
    let message_log = Arc::new(MessageLog::default());
    let processor = Arc::new(
        Processor::new(
            Arc::clone(&service),
            publisher.clone(),
            Arc::new(ExpressionCache::new()),
        )
        .with_message_log(Arc::clone(&message_log)),
    );

    let listeners = spawn_listeners(&config.brokers, &processor, &shutdown_rx)?;
    if listeners.is_empty() {
        warn!("No brokers configured; only the HTTP API is running");
    }

    let addr: SocketAddr =
        format!("{}:{}", config.server.bind_address, config.server.port).parse()?;
    let (_, api_task) = api::spawn_server(
        Arc::clone(&service),
        message_log,
        addr,
        shutdown_rx.clone(),
    )?;

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!(brokers = listeners.len(), "Bridge is running");

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    shutdown_tx.send(true)?;

    for listener in listeners {
        if let Err(e) = listener.await {
            error!("MQTT listener task failed: {}", e);
        }
    }
    publisher.join().await;
    if let Err(e) = api_task.await {
        error!("API server task failed: {}", e);
    }
    if let Some(reload) = reload_task {
        if let Err(e) = reload.await {
            error!("Store reload task failed: {}", e);
        }
    }

    Ok(())
}

fn handle_config_command(
    config: &BridgeConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
