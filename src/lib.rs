// ============================================================================
// Tutor Stack API Gateway
// ============================================================================
//
// One HTTP entry point in front of the Tutor Stack services:
// - auth: bearer token codec and claims
// - identity: claims -> caller identity
// - gateway: auth gate, registry, dispatcher, backends
// - auth_service: in-process account service mounted at /auth
// - routes: router assembly and the gateway's own endpoints
//
// ============================================================================

use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod auth;
pub mod auth_service;
pub mod config;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod routes;

use auth::TokenCodec;
use config::{Config, LogFormat};
use gateway::{ExemptPaths, GateState, GatewayState, ServiceRegistry};

/// Install the global tracing subscriber. Call once per process.
pub fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::new(config.rust_log.clone());
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Assemble the gateway around an already built registry
pub fn app_with_registry(
    config: Arc<Config>,
    codec: Arc<TokenCodec>,
    registry: ServiceRegistry,
) -> Router {
    let mut exempt = ExemptPaths::from_config(&config.gateway);
    if config.gateway.public_backend_health {
        exempt = exempt.with_health_checks(registry.all().iter().map(|r| r.prefix.as_str()));
    }

    let gate = Arc::new(GateState::new(codec, exempt, config.gateway.fail_open));
    if config.gateway.fail_open {
        tracing::warn!("AUTH_FAIL_OPEN is enabled: unauthenticated requests will reach services");
    }

    let state = GatewayState::new(config, registry);
    routes::create_router(state, gate)
}

/// Build the gateway from configuration
pub fn build_app(config: Arc<Config>) -> Result<Router> {
    let codec = Arc::new(
        TokenCodec::new(&config.jwt).context("Failed to initialize token codec")?,
    );
    tracing::info!(
        algorithm = ?codec.algorithm(),
        can_sign = codec.can_sign(),
        "Token codec ready"
    );

    let registry = gateway::build_registry(&config, codec.clone())
        .context("Failed to build service registry")?;

    Ok(app_with_registry(config, codec, registry))
}

/// Serve the gateway until ctrl-c or SIGTERM
pub async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);
    let app = build_app(config.clone())?;

    let bind_address = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&bind_address)
        .await
        .context("Failed to bind to address")?;

    tracing::info!("Gateway listening on {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Failed to start server")?;

    tracing::info!("Gateway stopped");
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
