// ============================================================================
// Service Directory
// ============================================================================
//
// Endpoints:
// - GET /             - Platform banner and the mounted services
// - GET /openapi.json - OpenAPI document for the gateway's own routes
//
// ============================================================================

use axum::{extract::State, Json};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::gateway::GatewayState;

/// GET /
pub async fn root(State(state): State<Arc<GatewayState>>) -> Json<Value> {
    let services: Map<String, Value> = state
        .registry()
        .all()
        .iter()
        .map(|r| (r.name.clone(), Value::String(r.prefix.clone())))
        .collect();

    Json(json!({
        "message": "Tutor Stack Platform",
        "services": services,
    }))
}

/// GET /openapi.json
pub async fn openapi(State(state): State<Arc<GatewayState>>) -> Json<Value> {
    let mut paths = Map::new();
    paths.insert(
        "/".to_string(),
        json!({"get": {"summary": "Root", "responses": {"200": {"description": "Platform banner and mounted services"}}}}),
    );
    paths.insert(
        "/health".to_string(),
        json!({"get": {"summary": "Health Check", "responses": {"200": {"description": "Gateway is up"}}}}),
    );
    for registration in state.registry().all() {
        paths.insert(
            format!("{}/health", registration.prefix),
            json!({"get": {
                "summary": format!("{} health", registration.name),
                "tags": [registration.name],
                "responses": {"200": {"description": "Service health as reported by the service"}}
            }}),
        );
    }

    Json(json!({
        "openapi": "3.0.2",
        "info": {
            "title": "Tutor Stack Platform",
            "description": "A comprehensive tutoring system with multiple services",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": paths,
        "components": {
            "securitySchemes": {
                "BearerAuth": {"type": "http", "scheme": "bearer", "bearerFormat": "JWT"}
            }
        },
        "security": [{"BearerAuth": []}],
    }))
}
