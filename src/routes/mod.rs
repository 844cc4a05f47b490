// ============================================================================
// Axum Routes Module
// ============================================================================
//
// Assembles the gateway: its own endpoints, the dispatcher fallback for every
// mounted prefix, and the middleware stack.
//
// Structure:
// - mod.rs: Main router assembly and middleware
// - directory.rs: Root listing and OpenAPI document
// - health.rs: Health check endpoint
// - middleware.rs: Request ids and request logging
//
// Middleware order (outermost first):
//   trace -> request id -> request logging -> CORS -> auth gate -> handler
//
// ============================================================================

mod directory;
mod health;
pub mod middleware;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::gateway::{auth_gate, route_request, GateState, GatewayState};

/// Create the main application router
pub fn create_router(state: Arc<GatewayState>, gate: Arc<GateState>) -> Router {
    Router::new()
        .route("/", get(directory::root))
        .route("/health", get(health::health_check))
        .route("/openapi.json", get(directory::openapi))
        // Everything else belongs to a mounted service
        .fallback(route_request)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                // Tracing layer (outermost - runs first)
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(middleware::request_id))
                .layer(axum::middleware::from_fn(middleware::request_logging))
                // Preflight requests are answered before the gate sees them
                .layer(CorsLayer::permissive())
                .layer(axum::middleware::from_fn_with_state(gate, auth_gate))
                .into_inner(),
        )
}
