// ============================================================================
// Auth Service Handlers
// ============================================================================
//
// Email/password accounts with stateless JWT sessions:
// - POST /register    JSON {email, password}
// - POST /jwt/login   form {username, password}
// - POST /jwt/logout  bearer; tokens stay valid until they expire
// - GET  /users/me    bearer
//
// ============================================================================

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    Form, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AuthError, TokenGrant};
use crate::auth_service::store::UserRead;
use crate::auth_service::AuthServiceContext;
use crate::error::{AppError, AppResult};
use crate::gateway::middleware::bearer_token;
use crate::identity::{self, Identity};

pub const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 72;

#[derive(Debug, Deserialize)]
pub struct UserCreate {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct BearerResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

/// Identity of the caller: the one attached by the gateway, or one decoded
/// from the bearer token when the service is reached directly
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

#[async_trait]
impl FromRequestParts<Arc<AuthServiceContext>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AuthServiceContext>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<Identity>() {
            return Ok(CurrentUser(identity.clone()));
        }

        let token = bearer_token(&parts.headers)?;
        let claims = state.codec.decode(token)?;
        Ok(CurrentUser(identity::resolve(claims)?))
    }
}

fn validate_email(email: &str) -> AppResult<()> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(AppError::validation("value is not a valid email address"))
    }
}

fn validate_password(password: &str) -> AppResult<()> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::validation(format!(
            "Password should be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    // bcrypt ignores everything past 72 bytes
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::validation(format!(
            "Password should be at most {} bytes",
            MAX_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::internal(format!("Password hashing task failed: {}", e)))?
        .map_err(|e| AppError::internal(format!("Password hashing failed: {}", e)))
}

async fn verify_password(password: String, hashed: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hashed))
        .await
        .map_err(|e| AppError::internal(format!("Password verification task failed: {}", e)))?
        .map_err(|e| AppError::internal(format!("Password verification failed: {}", e)))
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Tutor Stack Auth Service",
        "endpoints": {
            "register": "/auth/register",
            "login": "/auth/jwt/login",
            "logout": "/auth/jwt/logout",
            "me": "/auth/users/me",
            "openapi": "/auth/openapi.json",
        }
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({"status": "healthy", "service": "auth"}))
}

pub async fn openapi() -> Json<Value> {
    Json(json!({
        "openapi": "3.0.2",
        "info": {"title": "Tutor Stack Auth Service", "version": env!("CARGO_PKG_VERSION")},
        "paths": {
            "/register": {"post": {
                "summary": "Register",
                "requestBody": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/UserCreate"}}}},
                "responses": {
                    "201": {"description": "User created", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/UserRead"}}}},
                    "400": {"description": "REGISTER_USER_ALREADY_EXISTS or VALIDATION_ERROR"}
                }
            }},
            "/jwt/login": {"post": {
                "summary": "Login",
                "requestBody": {"content": {"application/x-www-form-urlencoded": {"schema": {"$ref": "#/components/schemas/LoginForm"}}}},
                "responses": {
                    "200": {"description": "Access token", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/BearerResponse"}}}},
                    "400": {"description": "LOGIN_BAD_CREDENTIALS"}
                }
            }},
            "/jwt/logout": {"post": {
                "summary": "Logout",
                "security": [{"OAuth2PasswordBearer": []}],
                "responses": {"204": {"description": "Logged out"}, "401": {"description": "Missing token or inactive user"}}
            }},
            "/users/me": {"get": {
                "summary": "Current user",
                "security": [{"OAuth2PasswordBearer": []}],
                "responses": {
                    "200": {"description": "Current user", "content": {"application/json": {"schema": {"$ref": "#/components/schemas/UserRead"}}}},
                    "401": {"description": "Missing token or inactive user"}
                }
            }}
        },
        "components": {
            "schemas": {
                "UserCreate": {"type": "object", "required": ["email", "password"], "properties": {
                    "email": {"type": "string", "format": "email"},
                    "password": {"type": "string", "minLength": MIN_PASSWORD_LENGTH}
                }},
                "UserRead": {"type": "object", "properties": {
                    "id": {"type": "string", "format": "uuid"},
                    "email": {"type": "string", "format": "email"},
                    "is_active": {"type": "boolean"},
                    "is_superuser": {"type": "boolean"},
                    "is_verified": {"type": "boolean"}
                }},
                "LoginForm": {"type": "object", "required": ["username", "password"], "properties": {
                    "username": {"type": "string"},
                    "password": {"type": "string"}
                }},
                "BearerResponse": {"type": "object", "properties": {
                    "access_token": {"type": "string"},
                    "token_type": {"type": "string"}
                }}
            },
            "securitySchemes": {
                "OAuth2PasswordBearer": {"type": "oauth2", "flows": {"password": {"tokenUrl": "jwt/login", "scopes": {}}}}
            }
        }
    }))
}

pub async fn register(
    State(ctx): State<Arc<AuthServiceContext>>,
    payload: Result<Json<UserCreate>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(request) = payload.map_err(|e| AppError::validation(e.body_text()))?;

    validate_email(&request.email)?;
    validate_password(&request.password)?;

    if ctx.users.find_by_email(&request.email).await.is_some() {
        return Err(AppError::UserAlreadyExists);
    }

    let hashed = hash_password(request.password, ctx.bcrypt_cost).await?;
    // create() re-checks under the write lock
    let user = ctx
        .users
        .create(&request.email, hashed)
        .await
        .ok_or(AppError::UserAlreadyExists)?;

    tracing::info!(user_id = %user.id, "User registered");

    Ok((StatusCode::CREATED, Json(UserRead::from(&user))))
}

pub async fn login(
    State(ctx): State<Arc<AuthServiceContext>>,
    Form(form): Form<LoginForm>,
) -> AppResult<Json<BearerResponse>> {
    let Some(user) = ctx.users.find_by_email(&form.username).await else {
        tracing::debug!("Login attempt for unknown user");
        return Err(AppError::BadCredentials);
    };

    if !verify_password(form.password, user.hashed_password.clone()).await? {
        tracing::debug!(user_id = %user.id, "Login attempt with wrong password");
        return Err(AppError::BadCredentials);
    }
    if !user.is_active {
        tracing::debug!(user_id = %user.id, "Login attempt for inactive user");
        return Err(AppError::BadCredentials);
    }

    let grant = TokenGrant {
        is_active: user.is_active,
        is_verified: user.is_verified,
        roles: if user.is_superuser {
            vec!["superuser".to_string()]
        } else {
            Vec::new()
        },
    };
    let (access_token, _) = ctx.codec.issue(&user.id.to_string(), &grant)?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(BearerResponse {
        access_token,
        token_type: "bearer",
    }))
}

pub async fn logout(CurrentUser(identity): CurrentUser) -> StatusCode {
    tracing::info!(user_id = %identity.subject, "User logged out");
    StatusCode::NO_CONTENT
}

pub async fn me(
    State(ctx): State<Arc<AuthServiceContext>>,
    CurrentUser(identity): CurrentUser,
) -> AppResult<Json<UserRead>> {
    let id = Uuid::parse_str(&identity.subject)
        .map_err(|_| AuthError::InvalidToken("subject is not a user id".to_string()))?;

    let user = ctx
        .users
        .find_by_id(id)
        .await
        .ok_or_else(|| AuthError::InvalidToken("unknown user".to_string()))?;
    if !user.is_active {
        return Err(AuthError::InactiveUser.into());
    }

    Ok(Json(UserRead::from(&user)))
}
