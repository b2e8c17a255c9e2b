//! Player Simulator CLI Tool
//!
//! Creates random players on an interval and opens a matchmaking ticket for
//! each one on the Open Match frontend.
//!
//! Usage:
//!   cargo run --bin player-simulator -- --help
//!   cargo run --bin player-simulator -- --interval 5s --players-pool 10
//!   cargo run --bin player-simulator -- --frontend-addr http://localhost:51504

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use match_director::config::{validate_config, AppConfig};
use match_director::openmatch::HttpFrontendClient;
use match_director::simulator::PlayerSimulator;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "player-simulator")]
#[command(about = "Creates matchmaking tickets for random players against an Open Match frontend")]
struct Cli {
    /// Configuration file path (TOML format)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Time between batches of players, e.g. 5s
    #[arg(long, value_name = "DURATION")]
    interval: Option<String>,

    /// Players created per batch
    #[arg(long, value_name = "COUNT")]
    players_pool: Option<usize>,

    /// Open Match frontend address
    #[arg(long, value_name = "ADDR")]
    frontend_addr: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env()?,
    };

    if let Some(interval) = &cli.interval {
        config.simulator.interval = interval.clone();
    }
    if let Some(players_pool) = cli.players_pool {
        config.simulator.players_pool = players_pool;
    }
    if let Some(addr) = &cli.frontend_addr {
        config.openmatch.frontend_addr = addr.clone();
    }
    if let Some(log_level) = &cli.log_level {
        config.service.log_level = log_level.clone();
    }

    validate_config(&config)?;
    Ok(config)
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.service.log_level.as_str().into()),
        )
        .with_target(false)
        .init();

    let frontend = match HttpFrontendClient::new(config.frontend_endpoint()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create frontend client: {:#}", e);
            std::process::exit(1);
        }
    };

    let simulator = Arc::new(PlayerSimulator::new(config.simulator_config(), frontend)?);
    info!("🔌 Sending tickets to {}", config.openmatch.frontend_addr);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = {
        let simulator = simulator.clone();
        tokio::spawn(async move { simulator.run(shutdown_rx).await })
    };

    wait_for_shutdown_signal().await;
    info!("🛑 Stopping player simulator...");
    shutdown_tx.send_replace(true);

    match running.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Simulator failed: {:#}", e),
        Err(e) => error!("Simulator task panicked: {}", e),
    }

    println!("Created tickets for {} players", simulator.total_players());
    Ok(())
}
