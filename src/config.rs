use anyhow::{Context, Result};
use jsonwebtoken::Algorithm;
use std::str::FromStr;

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 3600;
const DEFAULT_SERVICE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

/// Request bodies above this size are rejected before forwarding (2 MB)
pub const MAX_REQUEST_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Paths under these prefixes never require a bearer token
pub const DEFAULT_EXEMPT_PREFIXES: &[&str] = &["/auth/register", "/auth/jwt/login", "/auth/google"];

/// Exact paths that never require a bearer token
pub const DEFAULT_EXEMPT_PATHS: &[&str] = &[
    "/",
    "/health",
    "/openapi.json",
    "/auth",
    "/auth/",
    "/auth/openapi.json",
];

// ============================================================================
// Configuration Structures
// ============================================================================

/// Token signing and verification settings
#[derive(Clone, Debug)]
pub struct JwtConfig {
    /// Algorithm every accepted token must be signed with (JWT_ALG)
    pub algorithm: Algorithm,
    /// Verification material: PEM public key for asymmetric algorithms,
    /// shared secret for HS*
    pub public_key: String,
    /// Signing material for asymmetric algorithms. HS* signs with `public_key`.
    pub private_key: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub access_token_ttl_secs: i64,
}

/// Auth gate behaviour
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Forward requests whose authentication failed instead of rejecting them.
    /// Only safe when an edge proxy has already enforced authentication.
    pub fail_open: bool,
    pub exempt_prefixes: Vec<String>,
    pub exempt_paths: Vec<String>,
    /// Also exempt `<prefix>/health` of every mounted backend
    pub public_backend_health: bool,
    pub service_timeout_secs: u64,
    pub max_request_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            fail_open: false,
            exempt_prefixes: DEFAULT_EXEMPT_PREFIXES.iter().map(|p| p.to_string()).collect(),
            exempt_paths: DEFAULT_EXEMPT_PATHS.iter().map(|p| p.to_string()).collect(),
            public_backend_health: true,
            service_timeout_secs: DEFAULT_SERVICE_TIMEOUT_SECS,
            max_request_body_bytes: MAX_REQUEST_BODY_SIZE,
        }
    }
}

/// Where each mounted backend lives. `None` means "not deployed": the slot is
/// filled with a placeholder (or, for auth, the in-process auth service).
#[derive(Clone, Debug)]
pub struct ServicesConfig {
    pub content_url: Option<String>,
    pub assessment_url: Option<String>,
    pub notify_url: Option<String>,
    pub chat_url: Option<String>,
    pub auth_url: Option<String>,
    /// Mount prefix of the notification service ("/notify" or "/notifier")
    pub notify_prefix: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            content_url: None,
            assessment_url: None,
            notify_url: None,
            chat_url: None,
            auth_url: None,
            notify_prefix: "/notify".to_string(),
        }
    }
}

/// Circuit breaker configuration for remote backends
#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    /// Consecutive failures before the circuit opens (default: 5)
    pub failure_threshold: u32,
    /// Successes in half-open state before the circuit closes (default: 2)
    pub success_threshold: u32,
    /// Seconds the circuit stays open before a trial request (default: 60)
    pub timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 2,
            timeout_secs: 60,
        }
    }
}

/// In-process auth service settings
#[derive(Clone, Debug)]
pub struct AuthServiceConfig {
    pub bcrypt_cost: u32,
}

impl Default for AuthServiceConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: DEFAULT_BCRYPT_COST,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" | "plain" => Ok(Self::Pretty),
            _ => anyhow::bail!("Invalid LOG_FORMAT: {}. Must be 'json' or 'pretty'", s),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub log_format: LogFormat,
    pub jwt: JwtConfig,
    pub gateway: GatewayConfig,
    pub services: ServicesConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub auth_service: AuthServiceConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let algorithm = match std::env::var("JWT_ALG") {
            Ok(alg) => parse_algorithm(&alg)?,
            Err(_) => Algorithm::RS256,
        };

        let public_key = std::env::var("JWT_PUBLIC_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(|key| load_key_material(key, algorithm))
            .context(
                "JWT_PUBLIC_KEY must be set (PEM public key, key file path, or the HS* shared secret)",
            )?;

        Ok(Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_format: std::env::var("LOG_FORMAT")
                .ok()
                .map(|f| f.parse())
                .transpose()?
                .unwrap_or(LogFormat::Pretty),
            jwt: JwtConfig {
                algorithm,
                public_key,
                private_key: std::env::var("JWT_PRIVATE_KEY")
                    .ok()
                    .filter(|key| !key.trim().is_empty())
                    .map(|key| load_key_material(key, algorithm)),
                issuer: non_empty_var("JWT_ISSUER"),
                audience: non_empty_var("JWT_AUDIENCE"),
                access_token_ttl_secs: std::env::var("ACCESS_TOKEN_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_SECS),
            },
            gateway: GatewayConfig {
                fail_open: std::env::var("AUTH_FAIL_OPEN")
                    .map(|v| v.to_lowercase() == "true")
                    .unwrap_or(false),
                exempt_prefixes: std::env::var("AUTH_EXEMPT_PREFIXES")
                    .map(|v| split_list(&v))
                    .unwrap_or_else(|_| {
                        DEFAULT_EXEMPT_PREFIXES.iter().map(|p| p.to_string()).collect()
                    }),
                exempt_paths: std::env::var("AUTH_EXEMPT_PATHS")
                    .map(|v| split_list(&v))
                    .unwrap_or_else(|_| {
                        DEFAULT_EXEMPT_PATHS.iter().map(|p| p.to_string()).collect()
                    }),
                public_backend_health: std::env::var("PUBLIC_BACKEND_HEALTH")
                    .map(|v| v.to_lowercase() != "false")
                    .unwrap_or(true),
                service_timeout_secs: std::env::var("SERVICE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SERVICE_TIMEOUT_SECS),
                max_request_body_bytes: std::env::var("MAX_REQUEST_BODY_BYTES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(MAX_REQUEST_BODY_SIZE),
            },
            services: ServicesConfig {
                content_url: non_empty_var("CONTENT_SERVICE_URL"),
                assessment_url: non_empty_var("ASSESSMENT_SERVICE_URL"),
                notify_url: non_empty_var("NOTIFY_SERVICE_URL"),
                chat_url: non_empty_var("CHAT_SERVICE_URL"),
                auth_url: non_empty_var("AUTH_SERVICE_URL"),
                notify_prefix: std::env::var("NOTIFY_PREFIX")
                    .unwrap_or_else(|_| "/notify".to_string()),
            },
            circuit_breaker: CircuitBreakerConfig {
                enabled: std::env::var("CIRCUIT_BREAKER_ENABLED")
                    .map(|v| v.to_lowercase() != "false")
                    .unwrap_or(true),
                failure_threshold: std::env::var("CIRCUIT_BREAKER_FAILURE_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
                success_threshold: std::env::var("CIRCUIT_BREAKER_SUCCESS_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
                timeout_secs: std::env::var("CIRCUIT_BREAKER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            },
            auth_service: AuthServiceConfig {
                bcrypt_cost: std::env::var("BCRYPT_COST")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_BCRYPT_COST),
            },
        })
    }
}

/// Parse a JWT algorithm name such as "RS256" or "hs256"
pub fn parse_algorithm(name: &str) -> Result<Algorithm> {
    Algorithm::from_str(&name.trim().to_uppercase())
        .map_err(|_| anyhow::anyhow!("Unsupported JWT_ALG: {}", name))
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Key material is either inline (PEM or secret) or a path to a file holding it.
/// HS* keys are shared secrets and always taken as-is.
fn load_key_material(key: String, algorithm: Algorithm) -> String {
    let is_secret = matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    );
    if is_secret || key.starts_with("-----BEGIN") || !key.contains(std::path::MAIN_SEPARATOR) {
        return key;
    }
    std::fs::read_to_string(&key).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to read key file, using value as-is");
        key
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn parse_algorithm_is_case_insensitive() {
        assert_eq!(parse_algorithm("hs256").unwrap(), Algorithm::HS256);
        assert_eq!(parse_algorithm(" RS256 ").unwrap(), Algorithm::RS256);
        assert!(parse_algorithm("none").is_err());
    }

    #[test]
    fn split_list_drops_blank_entries() {
        assert_eq!(
            split_list("/a, /b,, ,/c"),
            vec!["/a".to_string(), "/b".to_string(), "/c".to_string()]
        );
    }

    #[test]
    fn inline_pem_is_not_treated_as_path() {
        let pem = "-----BEGIN PUBLIC KEY-----\nabc/def\n-----END PUBLIC KEY-----".to_string();
        assert_eq!(load_key_material(pem.clone(), Algorithm::RS256), pem);
    }

    #[test]
    fn key_file_is_loaded() {
        let path = format!("{}/tests/keys/test_public.pem", env!("CARGO_MANIFEST_DIR"));
        let loaded = load_key_material(path, Algorithm::RS256);
        assert!(loaded.starts_with("-----BEGIN PUBLIC KEY-----"));
    }

    #[test]
    fn shared_secret_with_slashes_is_kept_verbatim() {
        let secret = "k3y/with+base64/chars==".to_string();
        assert_eq!(load_key_material(secret.clone(), Algorithm::HS256), secret);

        // even when it happens to name a real file
        let path = format!("{}/tests/keys/test_public.pem", env!("CARGO_MANIFEST_DIR"));
        assert_eq!(load_key_material(path.clone(), Algorithm::HS512), path);
    }

    #[test]
    #[serial]
    fn from_env_reads_gateway_settings() {
        std::env::set_var("JWT_ALG", "HS256");
        std::env::set_var("JWT_PUBLIC_KEY", "test-secret");
        std::env::set_var("AUTH_FAIL_OPEN", "TRUE");
        std::env::set_var("AUTH_EXEMPT_PREFIXES", "/public,/auth/register");
        std::env::set_var("NOTIFY_PREFIX", "/notifier");
        std::env::set_var("CONTENT_SERVICE_URL", "  ");

        let config = Config::from_env().unwrap();
        assert_eq!(config.jwt.algorithm, Algorithm::HS256);
        assert_eq!(config.jwt.public_key, "test-secret");
        assert!(config.gateway.fail_open);
        assert_eq!(config.gateway.exempt_prefixes, vec!["/public", "/auth/register"]);
        assert_eq!(config.services.notify_prefix, "/notifier");
        assert_eq!(config.services.content_url, None);

        for var in [
            "JWT_ALG",
            "JWT_PUBLIC_KEY",
            "AUTH_FAIL_OPEN",
            "AUTH_EXEMPT_PREFIXES",
            "NOTIFY_PREFIX",
            "CONTENT_SERVICE_URL",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn from_env_requires_verification_key() {
        std::env::remove_var("JWT_PUBLIC_KEY");
        assert!(Config::from_env().is_err());
    }
}
