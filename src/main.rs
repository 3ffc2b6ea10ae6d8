//! dermascore - asynchronous skin-analysis gateway
//!
//! Loads configuration, wires the analysis service and serves the HTTP API
//! until SIGINT or SIGTERM.

use clap::{Parser, Subcommand};
use dermascore::api;
use dermascore::config::ServiceConfig;
use dermascore::observability::init_default_logging;
use dermascore::service::AnalysisService;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Asynchronous skin-analysis gateway
#[derive(Parser)]
#[command(name = "dermascore")]
#[command(about = "Submit/poll gateway for remote skin analysis with score synthesis")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "DERMASCORE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve,
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

    info!("Starting dermascore v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<ServiceConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(ServiceConfig::load_from_file(path)?)
        }
        None => {
            for path_str in ["dermascore.toml", "config/dermascore.toml"] {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(ServiceConfig::load_from_file(&path)?);
                }
            }

            warn!("No configuration file found, using defaults");
            Ok(ServiceConfig::default())
        }
    }
}

async fn serve(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr =
        format!("{}:{}", config.server.bind_address, config.server.port).parse()?;
    let service = Arc::new(AnalysisService::from_config(&config)?);

    info!(
        protocol = %config.remote.protocol,
        base_url = %config.remote.base_url,
        "Analysis service ready"
    );

    api::serve(service.clone(), addr, shutdown_signal()).await?;

    let aborted = service.shutdown();
    if aborted > 0 {
        warn!(aborted, "In-flight analyses were abandoned at shutdown");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
}

fn handle_config_command(
    config: &ServiceConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    info!("Configuration is valid");

    match config.get_remote_api_key() {
        Ok(_) => info!("Remote API key found in {}", config.remote.api_key_env),
        Err(_) => warn!(
            "Remote API key not set ({}); submissions will be rejected",
            config.remote.api_key_env
        ),
    }

    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }

    Ok(())
}
