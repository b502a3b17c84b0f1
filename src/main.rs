//! # Auth Gateway - Main Entry Point
//!
//! Loads configuration (`GATEWAY_CONFIG_PATH`, default `config/gateway.yaml`, falling
//! back to built-in defaults plus environment overrides), installs logging, bootstraps
//! the Firebase verifier and serves until SIGINT/SIGTERM.

use tracing::{error, info};

use auth_gateway::observability::init_logging;
use auth_gateway::{GatewayConfig, GatewayResult, GatewayServer};

#[tokio::main]
async fn main() -> GatewayResult<()> {
    let config_path = std::env::var("GATEWAY_CONFIG_PATH")
        .unwrap_or_else(|_| "config/gateway.yaml".to_string());

    let config = match GatewayConfig::load(&config_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", config_path, e);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging)?;

    info!("Starting auth gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        composite = %config.services.composite,
        timeout = ?config.proxy.upstream_timeout,
        "Forwarding to composite service"
    );

    let server = match GatewayServer::from_config(&config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start gateway: {}", e);
            std::process::exit(1);
        }
    };

    server.start().await?;

    info!("Auth gateway shutdown complete");
    Ok(())
}
