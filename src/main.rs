// ============================================================================
// Tutor Stack Gateway
// ============================================================================
//
// Single entry point for the Tutor Stack services:
// - /content, /assessment, /notify, /chat: remote services or placeholders
// - /auth: remote auth service or the in-process one
//
// Configuration comes from the environment (and `.env`); see config.rs.
//
// ============================================================================

use anyhow::{Context, Result};
use tracing::info;
use tutor_gateway::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tutor_gateway::init_tracing(&config);

    info!("=== Tutor Stack Gateway Starting ===");
    info!("Port: {}", config.port);
    info!(
        fail_open = config.gateway.fail_open,
        service_timeout_secs = config.gateway.service_timeout_secs,
        "Auth gate configured"
    );

    tutor_gateway::run(config).await
}
