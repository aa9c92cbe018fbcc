//! # Relay Broker Runtime
//!
//! The `relayd` entry point. Configuration comes from environment
//! overrides on top of the documented defaults; telemetry (tracing
//! subscriber plus metric registration) is initialized before anything
//! else logs; then the broker service binds its two listeners and runs
//! until ctrl-c.

use anyhow::{Context, Result};
use relay_server::{BrokerConfig, BrokerService};
use relay_telemetry::{init_telemetry, TelemetryConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    let _telemetry_guard = init_telemetry(&telemetry).context("Failed to initialize telemetry")?;

    let config = BrokerConfig::from_env().context("Failed to load configuration")?;

    let mut service = BrokerService::new(config).context("Failed to assemble broker")?;

    info!("===========================================");
    info!("  Relay Broker v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");
    info!("Endpoint listener: {}", service.config().endpoint_addr());
    info!("Auth listener: {}", service.config().auth_addr());

    service.start().await.context("Failed to start broker")?;

    info!("Broker is running. Press ctrl-c to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for shutdown signal")?;

    service.shutdown().await;

    Ok(())
}
