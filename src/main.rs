//! MQTT vacuum map service - main entry point

use clap::{Parser, Subcommand};
use mqtt_vacuum_map::config::ServiceConfig;
use mqtt_vacuum_map::connector::Connector;
use mqtt_vacuum_map::coordinator::Coordinator;
use mqtt_vacuum_map::observability::init_default_logging;
use mqtt_vacuum_map::registry::{identity_from_record, InMemoryRegistry, VacuumRegistry};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// MQTT map and state ingestion for Valetudo-family robot vacuums
#[derive(Parser)]
#[command(name = "mqtt-vacuum-map")]
#[command(about = "MQTT map and state ingestion for Valetudo-family robot vacuums")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ingestion service
    Run,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();
    info!("starting mqtt-vacuum-map v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {e}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => run_service(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("command failed: {e}");
        process::exit(1);
    }

    info!("shutdown complete");
}

fn load_configuration(config_path: &Option<PathBuf>) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("loading configuration from {}", path.display());
            Ok(ServiceConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["vacuum-map.toml", "config/vacuum-map.toml"];
            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("loading configuration from {}", path.display());
                    return Ok(ServiceConfig::load_from_file(&path)?);
                }
            }
            Err("no configuration file found; pass -c/--config or create vacuum-map.toml".into())
        }
    }
}

fn handle_config_command(
    config: ServiceConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    info!(vacuums = config.vacuums.len(), "configuration is valid");
    if show {
        println!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}

async fn run_service(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.vacuums.is_empty() {
        return Err("no vacuums configured".into());
    }

    let registry = Arc::new(InMemoryRegistry::from_config(&config));
    let mut coordinator = Coordinator::new(registry.clone());

    for record in registry.all_records() {
        let identity = identity_from_record(&record);
        let connector = Connector::new(identity, &config.mqtt)?;
        coordinator.insert(record.name, connector);
    }

    coordinator.start_all()?;
    let coordinator = Arc::new(coordinator);

    // One refresh ticker per vacuum, each on its configured cadence
    let mut refresh_tasks = Vec::new();
    for vacuum in &config.vacuums {
        let coordinator = coordinator.clone();
        let name = vacuum.name.clone();
        let period = Duration::from_secs(vacuum.refresh_interval_secs.max(1));
        refresh_tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = coordinator.refresh(&name).await {
                    warn!(vacuum = %name, error = %e, "refresh cycle failed");
                }
            }
        }));
    }

    info!(vacuums = config.vacuums.len(), "service running");
    wait_for_shutdown_signal().await;
    info!("shutdown signal received");

    for task in &refresh_tasks {
        task.abort();
    }
    for task in refresh_tasks {
        let _ = task.await;
    }

    match Arc::try_unwrap(coordinator) {
        Ok(mut coordinator) => coordinator.stop_all().await?,
        Err(_) => warn!("coordinator still shared at shutdown, skipping clean stop"),
    }

    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                let _ = signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
