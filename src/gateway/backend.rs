// ============================================================================
// Backends
// ============================================================================
//
// Every mounted service, real or placeholder, is reached through one
// capability: handle(request) -> response. Implementations:
// - RemoteBackend: forwards over HTTP to a separately deployed service
// - LocalBackend: an in-process axum Router (auth service, placeholders,
//   test doubles)
//
// The request handed to a backend already has its mount prefix stripped.
//
// ============================================================================

use crate::config::{CircuitBreakerConfig, MAX_REQUEST_BODY_SIZE};
use crate::gateway::circuit_breaker::CircuitBreaker;
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, Request, Response, StatusCode},
    routing::get,
    Json, Router,
};
use http_body_util::LengthLimitError;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Remote,
    Local,
    Placeholder,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Remote => write!(f, "remote"),
            BackendKind::Local => write!(f, "local"),
            BackendKind::Placeholder => write!(f, "placeholder"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unavailable(String),

    #[error("backend timed out")]
    Timeout,

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("failed to read request body: {0}")]
    RequestBody(String),
}

impl BackendError {
    /// Classify a failure to buffer the request body
    fn from_body_error(error: axum::Error, limit: usize) -> Self {
        let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&error);
        while let Some(e) = source {
            if e.is::<LengthLimitError>() {
                return BackendError::PayloadTooLarge(limit);
            }
            source = e.source();
        }
        BackendError::RequestBody(error.to_string())
    }
}

/// A mounted service
#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn handle(&self, request: Request<Body>) -> Result<Response<Body>, BackendError>;

    /// Called when the caller gave up waiting on `handle`
    async fn record_timeout(&self) {}
}

// ============================================================================
// Remote backend
// ============================================================================

/// Hop-by-hop headers are connection-scoped and never forwarded
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if name != header::HOST && !is_hop_by_hop(name) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}

/// Forwards requests to a service at `base_url`
pub struct RemoteBackend {
    name: String,
    base_url: String,
    client: reqwest::Client,
    circuit_breaker: CircuitBreaker,
    body_limit: usize,
}

impl RemoteBackend {
    pub fn new(
        name: &str,
        base_url: &str,
        connect_timeout: Duration,
        circuit_breaker_config: Arc<CircuitBreakerConfig>,
    ) -> Result<Self> {
        let parsed = reqwest::Url::parse(base_url)
            .with_context(|| format!("Invalid URL for service {}: {}", name, base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("Service {} URL must be http or https: {}", name, base_url);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            circuit_breaker: CircuitBreaker::new(circuit_breaker_config),
            body_limit: MAX_REQUEST_BODY_SIZE,
        })
    }

    /// Largest request body buffered for forwarding
    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn handle(&self, request: Request<Body>) -> Result<Response<Body>, BackendError> {
        if let Err(e) = self.circuit_breaker.allow_request().await {
            tracing::error!(
                service = %self.name,
                service_url = %self.base_url,
                error = %e,
                "Circuit breaker is open, rejecting request"
            );
            return Err(BackendError::CircuitOpen);
        }

        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target_url = format!("{}{}", self.base_url, path_and_query);

        let (parts, body) = request.into_parts();
        let body_bytes = axum::body::to_bytes(body, self.body_limit)
            .await
            .map_err(|e| BackendError::from_body_error(e, self.body_limit))?;

        let mut headers = forwardable_headers(&parts.headers);
        // reqwest sets it from the buffered body
        headers.remove(header::CONTENT_LENGTH);

        let mut outbound = self
            .client
            .request(parts.method, &target_url)
            .headers(headers);
        if !body_bytes.is_empty() {
            outbound = outbound.body(body_bytes);
        }

        let upstream = match outbound.send().await {
            Ok(response) => response,
            Err(e) => {
                self.circuit_breaker.record_failure().await;
                tracing::error!(
                    service = %self.name,
                    target_url = %target_url,
                    error = %e,
                    "Failed to forward request to service"
                );
                if e.is_timeout() {
                    return Err(BackendError::Timeout);
                }
                return Err(BackendError::Unavailable(e.to_string()));
            }
        };

        let status = upstream.status();
        // 4xx are client errors, not service failures
        if status.is_server_error() {
            self.circuit_breaker.record_failure().await;
        } else {
            self.circuit_breaker.record_success().await;
        }

        let headers = forwardable_headers(upstream.headers());
        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    async fn record_timeout(&self) {
        tracing::warn!(
            service = %self.name,
            service_url = %self.base_url,
            "Service did not answer in time"
        );
        self.circuit_breaker.record_failure().await;
    }
}

// ============================================================================
// In-process backend
// ============================================================================

/// Serves requests with an axum Router in the gateway process
pub struct LocalBackend {
    kind: BackendKind,
    router: Router,
}

impl LocalBackend {
    pub fn new(router: Router) -> Self {
        Self {
            kind: BackendKind::Local,
            router,
        }
    }

    /// Stand-in for a service that could not be mounted: answers `GET /health`
    /// and 404s everything else
    pub fn placeholder(name: &str) -> Self {
        let service = name.to_string();
        let router = Router::new()
            .route(
                "/health",
                get(move || {
                    let service = service.clone();
                    async move { Json(json!({"status": "placeholder", "service": service})) }
                }),
            )
            .fallback(|| async { (StatusCode::NOT_FOUND, Json(json!({"detail": "Not Found"}))) });

        Self {
            kind: BackendKind::Placeholder,
            router,
        }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn handle(&self, request: Request<Body>) -> Result<Response<Body>, BackendError> {
        let response: Result<Response<Body>, Infallible> =
            self.router.clone().oneshot(request).await;
        match response {
            Ok(response) => Ok(response),
            Err(never) => match never {},
        }
    }
}
