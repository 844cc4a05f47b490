// ============================================================================
// Gateway Router
// ============================================================================
//
// Routes requests to the mounted service whose prefix matches the path.
//
// Routing rules:
// - registrations are checked in order, the first literal prefix match wins
//   (so `/auth` mounted before `/auth/jwt` takes `/auth/jwt/login`)
// - the prefix is stripped; an empty remainder becomes `/`
// - the query string, method, headers and body are forwarded
// - no match -> 404
//
// ============================================================================

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::gateway::backend::BackendError;
use crate::gateway::registry::{Registration, ServiceRegistry};
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, Uri},
    response::Response,
};
use std::sync::Arc;
use std::time::Duration;

/// A registration selected for a path, with the path the backend will see
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub registration: &'a Registration,
    pub forwarded_path: String,
}

pub struct Dispatcher {
    registry: ServiceRegistry,
    timeout: Duration,
    max_body_bytes: usize,
}

impl Dispatcher {
    pub fn new(registry: ServiceRegistry, timeout: Duration, max_body_bytes: usize) -> Self {
        Self {
            registry,
            timeout,
            max_body_bytes,
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn route(&self, path: &str) -> Option<RouteMatch<'_>> {
        let registration = self
            .registry
            .all()
            .iter()
            .find(|r| path.starts_with(r.prefix.as_str()))?;

        let remainder = &path[registration.prefix.len()..];
        let forwarded_path = if remainder.is_empty() {
            "/".to_string()
        } else if remainder.starts_with('/') {
            remainder.to_string()
        } else {
            format!("/{}", remainder)
        };

        Some(RouteMatch {
            registration,
            forwarded_path,
        })
    }

    /// Forward `request` to its backend. Exactly one attempt is made.
    pub async fn dispatch(&self, mut request: Request<Body>) -> AppResult<Response<Body>> {
        let path = request.uri().path().to_string();
        let Some(route) = self.route(&path) else {
            return Err(AppError::NotFound { path });
        };
        let service = route.registration.name.as_str();

        if let Some(length) = content_length(&request) {
            if length > self.max_body_bytes {
                return Err(AppError::PayloadTooLarge {
                    limit: self.max_body_bytes,
                });
            }
        }

        let target = match request.uri().query() {
            Some(query) => format!("{}?{}", route.forwarded_path, query),
            None => route.forwarded_path.clone(),
        };
        *request.uri_mut() = Uri::try_from(target.as_str())
            .map_err(|e| AppError::validation(format!("Invalid request path: {}", e)))?;

        tracing::debug!(
            service = %service,
            path = %path,
            forwarded_path = %target,
            "Dispatching request"
        );

        let outcome =
            tokio::time::timeout(self.timeout, route.registration.backend.handle(request)).await;

        let outcome = match outcome {
            Ok(result) => result,
            Err(_) => {
                route.registration.backend.record_timeout().await;
                Err(BackendError::Timeout)
            }
        };

        match outcome {
            Ok(response) => Ok(response),
            Err(BackendError::Timeout) => Err(AppError::BackendTimeout {
                service: service.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
            Err(BackendError::CircuitOpen) => Err(AppError::BackendUnavailable {
                service: service.to_string(),
                reason: "circuit breaker is open".to_string(),
                circuit_open: true,
            }),
            Err(BackendError::Unavailable(reason)) => Err(AppError::BackendUnavailable {
                service: service.to_string(),
                reason,
                circuit_open: false,
            }),
            Err(BackendError::PayloadTooLarge(limit)) => Err(AppError::PayloadTooLarge { limit }),
            Err(BackendError::RequestBody(reason)) => Err(AppError::validation(format!(
                "Failed to read request body: {}",
                reason
            ))),
        }
    }
}

fn content_length(request: &Request<Body>) -> Option<usize> {
    request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Gateway router state
pub struct GatewayState {
    pub config: Arc<Config>,
    pub dispatcher: Dispatcher,
}

impl GatewayState {
    pub fn new(config: Arc<Config>, registry: ServiceRegistry) -> Arc<Self> {
        let dispatcher = Dispatcher::new(
            registry,
            Duration::from_secs(config.gateway.service_timeout_secs),
            config.gateway.max_request_body_bytes,
        );
        Arc::new(Self { config, dispatcher })
    }

    pub fn registry(&self) -> &ServiceRegistry {
        self.dispatcher.registry()
    }
}

/// Route request to the mounted service
pub async fn route_request(
    State(state): State<Arc<GatewayState>>,
    request: Request,
) -> AppResult<Response> {
    state.dispatcher.dispatch(request).await
}
