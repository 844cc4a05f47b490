// ============================================================================
// Auth Service
// ============================================================================
//
// In-process authentication service mounted at `/auth` when no remote
// AUTH_SERVICE_URL is configured. Issues the tokens the gateway verifies,
// so it needs a codec that can sign.
//
// Accounts live in memory and are lost on restart.
//
// ============================================================================

pub mod handlers;
pub mod store;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::auth::TokenCodec;
use crate::config::AuthServiceConfig;
use store::UserStore;

/// Auth Service context
pub struct AuthServiceContext {
    pub codec: Arc<TokenCodec>,
    pub users: UserStore,
    pub bcrypt_cost: u32,
}

impl AuthServiceContext {
    pub fn new(codec: Arc<TokenCodec>, config: &AuthServiceConfig) -> Result<Arc<Self>> {
        if !codec.can_sign() {
            anyhow::bail!("Auth service needs a signing key (JWT_PRIVATE_KEY) to issue tokens");
        }
        Ok(Arc::new(Self {
            codec,
            users: UserStore::new(),
            bcrypt_cost: config.bcrypt_cost,
        }))
    }
}

/// Routes relative to the mount prefix
pub fn create_router(context: Arc<AuthServiceContext>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/openapi.json", get(handlers::openapi))
        .route("/register", post(handlers::register))
        .route("/jwt/login", post(handlers::login))
        .route("/jwt/logout", post(handlers::logout))
        .route("/users/me", get(handlers::me))
        .with_state(context)
}
