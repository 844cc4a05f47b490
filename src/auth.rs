use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::JwtConfig;

/// Decoded token claims. `exp` and `sub` are required; everything else the
/// issuer put in the token is kept verbatim in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.extra.get(claim)
    }
}

/// Authentication failure taxonomy shared by the codec, the identity
/// resolver and the gate
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Bad token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    ExpiredToken,

    #[error("Inactive user")]
    InactiveUser,

    /// A claim is present but has the wrong shape
    #[error("Malformed claim `{claim}`: {reason}")]
    MalformedClaim { claim: String, reason: String },
}

impl AuthError {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::ExpiredToken => "expired_token",
            AuthError::InactiveUser => "inactive_user",
            AuthError::MalformedClaim { .. } => "malformed_claim",
        }
    }
}

/// Per-token facts the auth service stamps into issued tokens
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub is_active: bool,
    pub is_verified: bool,
    pub roles: Vec<String>,
}

impl Default for TokenGrant {
    fn default() -> Self {
        Self {
            is_active: true,
            is_verified: false,
            roles: Vec::new(),
        }
    }
}

#[derive(Serialize)]
struct IssuedClaims<'a> {
    sub: &'a str,
    exp: i64,
    iat: i64,
    jti: String,
    is_active: bool,
    is_verified: bool,
    #[serde(skip_serializing_if = "no_roles")]
    roles: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    iss: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    aud: Option<&'a str>,
}

fn no_roles(roles: &&[String]) -> bool {
    roles.is_empty()
}

/// Verifies bearer tokens with the configured algorithm and key.
///
/// Construction reads configuration once; `decode` never touches the
/// environment. A codec without signing material is verify-only.
pub struct TokenCodec {
    algorithm: Algorithm,
    decoding_key: DecodingKey,
    /// None if the gateway only verifies tokens (asymmetric public key only)
    encoding_key: Option<EncodingKey>,
    validation: Validation,
    issuer: Option<String>,
    audience: Option<String>,
    access_token_ttl_secs: i64,
}

impl TokenCodec {
    pub fn new(config: &JwtConfig) -> Result<Self> {
        let algorithm = config.algorithm;

        let (decoding_key, encoding_key) = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                tracing::info!(algorithm = ?algorithm, "Initializing token codec with shared secret");
                let secret = config.public_key.as_bytes();
                (
                    DecodingKey::from_secret(secret),
                    Some(EncodingKey::from_secret(secret)),
                )
            }
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => {
                let decoding_key = DecodingKey::from_rsa_pem(config.public_key.as_bytes())
                    .context("Failed to parse JWT_PUBLIC_KEY as RSA PEM")?;
                let encoding_key = config
                    .private_key
                    .as_ref()
                    .map(|pem| {
                        EncodingKey::from_rsa_pem(pem.as_bytes())
                            .context("Failed to parse JWT_PRIVATE_KEY as RSA PEM")
                    })
                    .transpose()?;
                (decoding_key, encoding_key)
            }
            Algorithm::ES256 | Algorithm::ES384 => {
                let decoding_key = DecodingKey::from_ec_pem(config.public_key.as_bytes())
                    .context("Failed to parse JWT_PUBLIC_KEY as EC PEM")?;
                let encoding_key = config
                    .private_key
                    .as_ref()
                    .map(|pem| {
                        EncodingKey::from_ec_pem(pem.as_bytes())
                            .context("Failed to parse JWT_PRIVATE_KEY as EC PEM")
                    })
                    .transpose()?;
                (decoding_key, encoding_key)
            }
            Algorithm::EdDSA => {
                let decoding_key = DecodingKey::from_ed_pem(config.public_key.as_bytes())
                    .context("Failed to parse JWT_PUBLIC_KEY as Ed25519 PEM")?;
                let encoding_key = config
                    .private_key
                    .as_ref()
                    .map(|pem| {
                        EncodingKey::from_ed_pem(pem.as_bytes())
                            .context("Failed to parse JWT_PRIVATE_KEY as Ed25519 PEM")
                    })
                    .transpose()?;
                (decoding_key, encoding_key)
            }
        };

        if encoding_key.is_none() {
            tracing::info!(algorithm = ?algorithm, "Token codec is verify-only (no JWT_PRIVATE_KEY)");
        }

        let mut validation = Validation::new(algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        match &config.issuer {
            Some(issuer) => validation.set_issuer(&[issuer]),
            None => validation.iss = None,
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            algorithm,
            decoding_key,
            encoding_key,
            validation,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_ttl_secs: config.access_token_ttl_secs,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn can_sign(&self) -> bool {
        self.encoding_key.is_some()
    }

    /// Verify signature, algorithm and required claims
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(AuthError::InvalidToken("empty subject".to_string()));
        }

        Ok(data.claims)
    }

    /// Sign an access token for `subject`.
    /// Returns (token, expires_at). Fails in verify-only mode.
    pub fn issue(&self, subject: &str, grant: &TokenGrant) -> Result<(String, i64)> {
        let encoding_key = self.encoding_key.as_ref().ok_or_else(|| {
            anyhow::anyhow!("Cannot create tokens: codec is verify-only (no JWT_PRIVATE_KEY configured)")
        })?;

        let now = Utc::now().timestamp();
        let exp = now + self.access_token_ttl_secs;
        let claims = IssuedClaims {
            sub: subject,
            exp,
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
            is_active: grant.is_active,
            is_verified: grant.is_verified,
            roles: &grant.roles,
            iss: self.issuer.as_deref(),
            aud: self.audience.as_deref(),
        };

        let token = encode(&Header::new(self.algorithm), &claims, encoding_key)
            .context("Failed to encode access token")?;

        Ok((token, exp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "unit-test-secret-that-is-long-enough";

    fn hs256_config() -> JwtConfig {
        JwtConfig {
            algorithm: Algorithm::HS256,
            public_key: SECRET.to_string(),
            private_key: None,
            issuer: None,
            audience: None,
            access_token_ttl_secs: 600,
        }
    }

    fn load_test_keys() -> (String, String) {
        let manifest_dir = env!("CARGO_MANIFEST_DIR");
        let private_key_path = format!("{}/tests/keys/test_private.pem", manifest_dir);
        let public_key_path = format!("{}/tests/keys/test_public.pem", manifest_dir);
        let private_key = std::fs::read_to_string(&private_key_path)
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", private_key_path, e));
        let public_key = std::fs::read_to_string(&public_key_path)
            .unwrap_or_else(|e| panic!("Failed to read {}: {}", public_key_path, e));
        (private_key, public_key)
    }

    fn sign(claims: &Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn decodes_valid_token_and_keeps_extra_claims() {
        let codec = TokenCodec::new(&hs256_config()).unwrap();
        let exp = Utc::now().timestamp() + 60;
        let token = sign(&json!({"sub": "user-1", "exp": exp, "is_active": true, "tenant": "t1"}));

        let claims = codec.decode(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.exp, exp);
        assert_eq!(claims.get("tenant"), Some(&json!("t1")));
        assert_eq!(claims.get("is_active"), Some(&json!(true)));
    }

    #[test]
    fn expired_token_is_distinct_from_invalid() {
        let codec = TokenCodec::new(&hs256_config()).unwrap();
        let token = sign(&json!({"sub": "user-1", "exp": Utc::now().timestamp() - 5}));
        assert_eq!(codec.decode(&token), Err(AuthError::ExpiredToken));

        let garbage = codec.decode("not-a-jwt");
        assert!(matches!(garbage, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn missing_required_claims_are_invalid() {
        let codec = TokenCodec::new(&hs256_config()).unwrap();
        let exp = Utc::now().timestamp() + 60;

        let no_sub = sign(&json!({"exp": exp}));
        assert!(matches!(codec.decode(&no_sub), Err(AuthError::InvalidToken(_))));

        let no_exp = sign(&json!({"sub": "user-1"}));
        assert!(matches!(codec.decode(&no_exp), Err(AuthError::InvalidToken(_))));

        let empty_sub = sign(&json!({"sub": "", "exp": exp}));
        assert!(matches!(codec.decode(&empty_sub), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let codec = TokenCodec::new(&hs256_config()).unwrap();
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({"sub": "user-1", "exp": Utc::now().timestamp() + 60}),
            &EncodingKey::from_secret(b"some-other-secret"),
        )
        .unwrap();
        assert!(matches!(codec.decode(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn algorithm_mismatch_is_invalid() {
        let codec = TokenCodec::new(&hs256_config()).unwrap();
        let token = encode(
            &Header::new(Algorithm::HS512),
            &json!({"sub": "user-1", "exp": Utc::now().timestamp() + 60}),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(codec.decode(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn issued_token_round_trips_through_decode() {
        let codec = TokenCodec::new(&hs256_config()).unwrap();
        let grant = TokenGrant {
            is_active: true,
            is_verified: false,
            roles: vec!["student".to_string()],
        };
        let (token, exp) = codec.issue("user-42", &grant).unwrap();

        let claims = codec.decode(&token).unwrap();
        assert_eq!(claims.sub, "user-42");
        assert_eq!(claims.exp, exp);
        assert_eq!(claims.get("roles"), Some(&json!(["student"])));
        assert!(claims.get("jti").is_some());
    }

    #[test]
    fn rs256_full_mode_signs_and_verifies() {
        let (private_key, public_key) = load_test_keys();
        let codec = TokenCodec::new(&JwtConfig {
            algorithm: Algorithm::RS256,
            public_key,
            private_key: Some(private_key),
            issuer: Some("tutor-stack".to_string()),
            audience: None,
            access_token_ttl_secs: 600,
        })
        .unwrap();
        assert!(codec.can_sign());

        let (token, _) = codec.issue("user-7", &TokenGrant::default()).unwrap();
        let claims = codec.decode(&token).unwrap();
        assert_eq!(claims.sub, "user-7");
        assert_eq!(claims.get("iss"), Some(&json!("tutor-stack")));
    }

    #[test]
    fn rs256_verify_only_mode_cannot_issue() {
        let (_, public_key) = load_test_keys();
        let codec = TokenCodec::new(&JwtConfig {
            algorithm: Algorithm::RS256,
            public_key,
            private_key: None,
            issuer: None,
            audience: None,
            access_token_ttl_secs: 600,
        })
        .unwrap();
        assert!(!codec.can_sign());
        assert!(codec.issue("user-7", &TokenGrant::default()).is_err());
    }

    #[test]
    fn rs256_rejects_unparseable_public_key() {
        let result = TokenCodec::new(&JwtConfig {
            algorithm: Algorithm::RS256,
            public_key: "change_me".to_string(),
            private_key: None,
            issuer: None,
            audience: None,
            access_token_ttl_secs: 600,
        });
        assert!(result.is_err());
    }

    #[test]
    fn issuer_mismatch_is_invalid() {
        let mut config = hs256_config();
        config.issuer = Some("expected-issuer".to_string());
        let codec = TokenCodec::new(&config).unwrap();
        let token = sign(&json!({
            "sub": "user-1",
            "exp": Utc::now().timestamp() + 60,
            "iss": "someone-else"
        }));
        assert!(matches!(codec.decode(&token), Err(AuthError::InvalidToken(_))));
    }
}
