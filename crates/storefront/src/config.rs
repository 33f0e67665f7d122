//! Storefront client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `AURELIA_API_URL` - Base URL of the backend REST API
//!
//! ## Optional
//! - `AURELIA_SESSION_FILE` - Where the session token is persisted (default: `.aurelia/session.json`)
//! - `AURELIA_API_TOKEN` - Bearer token used to seed the session on start
//! - `AURELIA_CART_DEBOUNCE_MS` - Quiescence window for quantity edits (default: 500)
//! - `AURELIA_HTTP_TIMEOUT_SECS` - HTTP request timeout (default: none)
//! - `AURELIA_PRODUCT_CACHE_TTL_SECS` - Product lookup cache TTL (default: 30)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const DEFAULT_SESSION_FILE: &str = ".aurelia/session.json";
const DEFAULT_DEBOUNCE_MS: u64 = 500;
const DEFAULT_PRODUCT_CACHE_TTL_SECS: u64 = 30;
const MIN_TOKEN_LENGTH: usize = 16;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Backend REST API configuration
    pub api: ApiConfig,
    /// Path of the persisted session token
    pub session_file: PathBuf,
    /// Token to seed the session with on start
    pub seed_token: Option<SecretString>,
    /// Cart behavior
    pub cart: CartConfig,
    /// Product lookup cache TTL
    pub product_cache_ttl: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Backend REST API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL, always ending in `/`
    pub base_url: Url,
    /// Request timeout; `None` keeps the HTTP client default
    pub timeout: Option<Duration>,
}

impl ApiConfig {
    /// Build an API configuration from a base URL string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the URL does not parse or is not http(s).
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: normalize_base_url(base_url, "AURELIA_API_URL")?,
            timeout: None,
        })
    }
}

/// Cart synchronization settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartConfig {
    /// Quiescence window before a quantity edit is committed
    pub debounce: Duration,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid, or
    /// if the seed token looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`StorefrontConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let base_url = vars.required("AURELIA_API_URL")?;
        let api = ApiConfig {
            base_url: normalize_base_url(&base_url, "AURELIA_API_URL")?,
            timeout: vars
                .optional_u64("AURELIA_HTTP_TIMEOUT_SECS")?
                .map(Duration::from_secs),
        };

        let session_file = PathBuf::from(vars.or_default("AURELIA_SESSION_FILE", DEFAULT_SESSION_FILE));

        let seed_token = match vars.optional("AURELIA_API_TOKEN") {
            Some(token) => {
                validate_token(&token, "AURELIA_API_TOKEN")?;
                Some(SecretString::from(token))
            }
            None => None,
        };

        let debounce_ms = vars
            .optional_u64("AURELIA_CART_DEBOUNCE_MS")?
            .unwrap_or(DEFAULT_DEBOUNCE_MS);
        let cache_ttl = vars
            .optional_u64("AURELIA_PRODUCT_CACHE_TTL_SECS")?
            .unwrap_or(DEFAULT_PRODUCT_CACHE_TTL_SECS);

        Ok(Self {
            api,
            session_file,
            seed_token,
            cart: CartConfig {
                debounce: Duration::from_millis(debounce_ms),
            },
            product_cache_ttl: Duration::from_secs(cache_ttl),
            sentry_dsn: vars.optional("SENTRY_DSN"),
            sentry_environment: vars.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Whether a seed token was configured.
    #[must_use]
    pub fn has_seed_token(&self) -> bool {
        self.seed_token
            .as_ref()
            .is_some_and(|token| !token.expose_secret().is_empty())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get an optional variable; empty values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Get an optional unsigned integer variable.
    fn optional_u64(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        self.optional(key)
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
            })
            .transpose()
    }
}

/// Parse a base URL and make sure relative joins land under it.
fn normalize_base_url(raw: &str, var_name: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("unsupported scheme {}", url.scheme()),
        ));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Reject tokens that are obviously not real credentials.
fn validate_token(value: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = value.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("contains placeholder pattern '{pattern}'"),
            ));
        }
    }

    if value.len() < MIN_TOKEN_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_TOKEN_LENGTH,
                value.len()
            ),
        ));
    }

    Ok(())
}
