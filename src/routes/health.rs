// ============================================================================
// Health Routes
// ============================================================================
//
// Endpoints:
// - GET /health - Gateway liveness
//
// Mounted services answer their own `<prefix>/health`; those requests are
// routed like any other.
//
// ============================================================================

use axum::Json;
use serde_json::{json, Value};

/// GET /health
pub async fn health_check() -> Json<Value> {
    Json(json!({"status": "healthy"}))
}
