//! Main entry point for the match director
//!
//! Runs either the director loop or the match function server, with
//! structured logging, health endpoints and graceful shutdown.

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use match_director::config::{validate_config, AllocatorMode, AppConfig};
use match_director::service::{AppState, ServiceRole};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};

/// Open Match director and match function for Agones game servers
#[derive(Parser)]
#[command(
    name = "match-director",
    version,
    about = "Matchmaking director and match function for Open Match and Agones",
    long_about = "The director fetches match proposals from Open Match for a set of match profiles, \
                  finds a game server for each through the discover API or the Agones allocator, \
                  and reports the assignments back. The match function packs pool tickets into \
                  proposals by player capacity."
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        global = true,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long, global = true, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        global = true,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch matches for every profile on an interval and assign game servers
    Director(DirectorArgs),
    /// Serve the player capacity match function
    Function(FunctionArgs),
}

#[derive(ClapArgs)]
struct DirectorArgs {
    /// Interval between fetches, e.g. 5s, 1m
    #[arg(long, value_name = "DURATION")]
    interval: Option<String>,

    /// Game server source: discover or agones
    #[arg(long, value_name = "MODE")]
    mode: Option<AllocatorMode>,

    /// Discover API base URL
    #[arg(long, value_name = "URL")]
    discover_url: Option<String>,

    /// Private key file for the client certificate (PEM)
    #[arg(long, value_name = "FILE")]
    key: Option<String>,

    /// Public key file for the client certificate (PEM)
    #[arg(long, value_name = "FILE")]
    cert: Option<String>,

    /// CA certificate for the allocator's server certificate (PEM)
    #[arg(long, value_name = "FILE")]
    cacert: Option<String>,

    /// Agones allocator service host
    #[arg(long, value_name = "HOST")]
    allocator_host: Option<String>,

    /// Agones allocator service port
    #[arg(long, value_name = "PORT")]
    allocator_port: Option<u16>,

    /// Game server namespace
    #[arg(long, value_name = "NAMESPACE")]
    namespace: Option<String>,

    /// Enable multi-cluster allocation
    #[arg(long)]
    multicluster: bool,
}

#[derive(ClapArgs)]
struct FunctionArgs {
    /// Port the match function listens on
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Players per match and pool
    #[arg(long, value_name = "COUNT")]
    player_capacity: Option<i64>,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
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
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig, role: ServiceRole) {
    info!("🚀 Match Director ({})", role);
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    match role {
        ServiceRole::Director => {
            info!("   Open Match backend: {}", config.openmatch.backend_addr);
            info!(
                "   Match function: {}:{}",
                config.openmatch.match_function_host, config.openmatch.match_function_port
            );
            info!("   Interval: {}", config.director.interval);
            info!("   Allocator mode: {}", config.director.mode);
        }
        ServiceRole::MatchFunction => {
            info!("   Open Match query: {}", config.openmatch.query_service_addr);
            info!("   Listening on: {}:{}", config.function.host, config.function.port);
            info!("   Player capacity: {}", config.function.player_capacity);
        }
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load configuration from a file or the environment, then apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    match &args.command {
        Command::Director(director) => {
            if let Some(interval) = &director.interval {
                config.director.interval = interval.clone();
            }
            if let Some(mode) = director.mode {
                config.director.mode = mode;
            }
            if let Some(url) = &director.discover_url {
                config.discover.url = url.clone();
            }
            if let Some(key) = &director.key {
                config.agones.key_file = key.clone();
            }
            if let Some(cert) = &director.cert {
                config.agones.cert_file = cert.clone();
            }
            if let Some(cacert) = &director.cacert {
                config.agones.ca_cert_file = cacert.clone();
            }
            if let Some(host) = &director.allocator_host {
                config.agones.host = host.clone();
            }
            if let Some(port) = director.allocator_port {
                config.agones.port = port;
            }
            if let Some(namespace) = &director.namespace {
                config.agones.namespace = namespace.clone();
            }
            if director.multicluster {
                config.agones.multi_cluster = true;
            }
        }
        Command::Function(function) => {
            if let Some(port) = function.port {
                config.function.port = port;
            }
            if let Some(capacity) = function.player_capacity {
                config.function.player_capacity = capacity;
            }
        }
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {:#}", e);
        std::process::exit(1);
    });

    // Initialize logging early (before any other operations)
    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let role = match args.command {
        Command::Director(_) => ServiceRole::Director,
        Command::Function(_) => ServiceRole::MatchFunction,
    };

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config, role);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config, role);

    info!("Initializing service components...");
    let app_state = match AppState::new(config, role).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting service...");
    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("✅ Match director is running as {}", role);
    info!("Press Ctrl+C to shutdown gracefully...");

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("🛑 Shutdown signal received, beginning graceful shutdown...");
        }
        _ = app_state.wait_for_exit() => {
            warn!("⚠️  {} exited unexpectedly, shutting down", role);
        }
    }

    if let Err(e) = app_state.shutdown().await {
        error!("Shutdown failed: {}", e);
        std::process::exit(1);
    }

    info!("🛑 Match director stopped");
    Ok(())
}
