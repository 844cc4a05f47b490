use serde::Serialize;
use serde_json::Value;

use crate::auth::{AuthError, Claims};

/// Caller identity derived from validated claims.
///
/// Request-scoped: the gate stores it in the request extensions and it is
/// dropped with the request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identity {
    pub subject: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub roles: Vec<String>,
    pub claims: Claims,
}

impl Identity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Turn validated claims into an [`Identity`].
///
/// `is_active` defaults to true when absent; `false` is `InactiveUser`.
pub fn resolve(claims: Claims) -> Result<Identity, AuthError> {
    let is_active = bool_claim(&claims, "is_active")?.unwrap_or(true);
    if !is_active {
        return Err(AuthError::InactiveUser);
    }

    let is_verified = bool_claim(&claims, "is_verified")?.unwrap_or(false);
    let roles = roles_claim(&claims)?;

    Ok(Identity {
        subject: claims.sub.clone(),
        is_active,
        is_verified,
        roles,
        claims,
    })
}

fn bool_claim(claims: &Claims, claim: &str) -> Result<Option<bool>, AuthError> {
    match claims.get(claim) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(other) => Err(AuthError::MalformedClaim {
            claim: claim.to_string(),
            reason: format!("expected boolean, got {}", json_type(other)),
        }),
    }
}

fn roles_claim(claims: &Claims) -> Result<Vec<String>, AuthError> {
    let malformed = |reason: String| AuthError::MalformedClaim {
        claim: "roles".to_string(),
        reason,
    };

    match claims.get("roles") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(role) => Ok(role.clone()),
                other => Err(malformed(format!(
                    "expected array of strings, found {}",
                    json_type(other)
                ))),
            })
            .collect(),
        Some(other) => Err(malformed(format!("expected array, got {}", json_type(other)))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
