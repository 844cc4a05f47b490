// ============================================================================
// Service wiring
// ============================================================================
//
// Builds the registry the gateway serves, in mount order:
//   content -> assessment -> notifier -> chat -> auth
//
// A service with no configured URL (or a URL that fails to parse) is mounted
// as a placeholder. Auth falls back to the in-process auth service.
//
// ============================================================================

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenCodec;
use crate::auth_service::{self, AuthServiceContext};
use crate::config::Config;
use crate::gateway::backend::{Backend, LocalBackend, RemoteBackend};
use crate::gateway::registry::{RegistryError, ServiceRegistry};

fn remote(
    config: &Config,
    name: &str,
    env_var: &str,
    url: Option<&str>,
) -> anyhow::Result<Arc<dyn Backend>> {
    let url = url.with_context(|| format!("{} is not set", env_var))?;
    let backend = RemoteBackend::new(
        name,
        url,
        Duration::from_secs(config.gateway.service_timeout_secs),
        Arc::new(config.circuit_breaker.clone()),
    )?
    .with_body_limit(config.gateway.max_request_body_bytes);
    Ok(Arc::new(backend))
}

fn auth_backend(config: &Config, codec: Arc<TokenCodec>) -> anyhow::Result<Arc<dyn Backend>> {
    if let Some(url) = config.services.auth_url.as_deref() {
        return remote(config, "auth", "AUTH_SERVICE_URL", Some(url));
    }

    let context = AuthServiceContext::new(codec, &config.auth_service)?;
    Ok(Arc::new(LocalBackend::new(auth_service::create_router(context))))
}

pub fn build_registry(
    config: &Config,
    codec: Arc<TokenCodec>,
) -> Result<ServiceRegistry, RegistryError> {
    let services = &config.services;

    let registry = ServiceRegistry::builder()
        .register_or_placeholder(
            "content",
            "/content",
            remote(config, "content", "CONTENT_SERVICE_URL", services.content_url.as_deref()),
        )?
        .register_or_placeholder(
            "assessment",
            "/assessment",
            remote(
                config,
                "assessment",
                "ASSESSMENT_SERVICE_URL",
                services.assessment_url.as_deref(),
            ),
        )?
        .register_or_placeholder(
            "notifier",
            &services.notify_prefix,
            remote(config, "notifier", "NOTIFY_SERVICE_URL", services.notify_url.as_deref()),
        )?
        .register_or_placeholder(
            "chat",
            "/chat",
            remote(config, "chat", "CHAT_SERVICE_URL", services.chat_url.as_deref()),
        )?
        .register_or_placeholder("auth", "/auth", auth_backend(config, codec))?
        .build();

    Ok(registry)
}
