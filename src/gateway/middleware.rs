// ============================================================================
// Auth Gate
// ============================================================================
//
// Runs in front of every mounted service, in one ordered pass:
// 0. paths with `.` or `..` segments -> 400 (fail_open does not apply)
// 1. exempt path -> forward untouched
// 2. `Authorization: Bearer <token>` present, otherwise MissingToken
// 3. decode and verify the token
// 4. resolve the claims into an Identity
// 5. attach the Identity to the request and forward
//
// Trust boundary: `x-user-id` from the client is always removed and only set
// again from a verified identity. Backends may trust it.
//
// With fail_open every failure is logged and the request is forwarded
// WITHOUT an identity. It is never treated as a valid session.
//
// ============================================================================

use crate::auth::{AuthError, TokenCodec};
use crate::config::GatewayConfig;
use crate::error::AppError;
use crate::identity::{self, Identity};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");

/// Paths the gate lets through without a token
#[derive(Debug, Clone, Default)]
pub struct ExemptPaths {
    prefixes: Vec<String>,
    exact: Vec<String>,
}

impl ExemptPaths {
    pub fn new(prefixes: Vec<String>, exact: Vec<String>) -> Self {
        Self { prefixes, exact }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.exempt_prefixes.clone(), config.exempt_paths.clone())
    }

    /// Exempt every `<prefix>/health` of the mounted services
    pub fn with_health_checks<'a>(mut self, prefixes: impl IntoIterator<Item = &'a str>) -> Self {
        for prefix in prefixes {
            self.exact.push(format!("{}/health", prefix));
        }
        self
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exact.iter().any(|p| p == path)
            || self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

/// Outcome of running the gate on one request
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Bypass,
    Authenticated(Identity),
    Rejected(AuthError),
    /// fail_open: the check failed but the request goes on unauthenticated
    PassedUnverified(AuthError),
}

pub struct GateState {
    codec: Arc<TokenCodec>,
    exempt: ExemptPaths,
    fail_open: bool,
}

impl GateState {
    pub fn new(codec: Arc<TokenCodec>, exempt: ExemptPaths, fail_open: bool) -> Self {
        Self {
            codec,
            exempt,
            fail_open,
        }
    }

    pub fn evaluate(&self, path: &str, headers: &HeaderMap) -> GateDecision {
        if self.exempt.is_exempt(path) {
            return GateDecision::Bypass;
        }

        let result = bearer_token(headers)
            .and_then(|token| self.codec.decode(token))
            .and_then(identity::resolve);

        match result {
            Ok(identity) => GateDecision::Authenticated(identity),
            Err(e) if self.fail_open => GateDecision::PassedUnverified(e),
            Err(e) => GateDecision::Rejected(e),
        }
    }
}

/// True if any segment is `.` or `..`, literal or percent-encoded. URL
/// resolution downstream would collapse them, so the path the gate checks
/// must not contain any.
pub fn has_dot_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

/// Token from `Authorization: Bearer <token>`; the scheme is case-insensitive
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let scheme = value.get(..7).ok_or(AuthError::MissingToken)?;
    if !scheme.eq_ignore_ascii_case("bearer ") {
        return Err(AuthError::MissingToken);
    }

    let token = value[7..].trim();
    if token.is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token)
}

/// Auth gate middleware
pub async fn auth_gate(State(gate): State<Arc<GateState>>, mut req: Request, next: Next) -> Response {
    req.headers_mut().remove(&USER_ID_HEADER);

    let path = req.uri().path().to_string();
    if has_dot_segment(&path) {
        tracing::warn!(path = %path, "Rejected path with dot segments");
        return AppError::validation("Request path must not contain dot segments").into_response();
    }

    match gate.evaluate(&path, req.headers()) {
        GateDecision::Bypass => {}
        GateDecision::Authenticated(identity) => {
            tracing::debug!(path = %path, user_id = %identity.subject, "Request authenticated");
            if let Ok(subject) = HeaderValue::from_str(&identity.subject) {
                req.headers_mut().insert(USER_ID_HEADER, subject);
            }
            req.extensions_mut().insert(identity);
        }
        GateDecision::PassedUnverified(e) => {
            tracing::warn!(
                path = %path,
                error_kind = e.kind(),
                error = %e,
                "Authentication failed, forwarding unauthenticated (fail-open)"
            );
        }
        GateDecision::Rejected(e) => {
            tracing::warn!(
                path = %path,
                error_kind = e.kind(),
                error = %e,
                "Request rejected by auth gate"
            );
            return AppError::from(e).into_response();
        }
    }

    next.run(req).await
}
