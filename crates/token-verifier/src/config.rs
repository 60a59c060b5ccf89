//! Verifier configuration.
//!
//! Configuration is loaded from environment variables or built
//! programmatically. Every value that influences a security decision is
//! validated at load time so a misconfigured verifier fails at startup
//! rather than at the first request.

use jsonwebtoken::Algorithm;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default signing algorithm expected from the provider.
pub const DEFAULT_ALGORITHM: Algorithm = Algorithm::RS256;

/// Default key set cache TTL in seconds (5 minutes).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Default clock skew tolerance in seconds (5 minutes).
pub const DEFAULT_CLOCK_SKEW_SECONDS: u64 = 300;

/// Maximum allowed clock skew tolerance in seconds (10 minutes).
pub const MAX_CLOCK_SKEW_SECONDS: u64 = 600;

/// Default key set fetch timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Algorithms a verifier may be configured to trust.
///
/// Asymmetric signatures only. Symmetric algorithms (HS256 and friends)
/// would require holding the provider's signing secret, which this crate
/// never does, so they are rejected at configuration time.
pub const SUPPORTED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::EdDSA,
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid clock skew configuration: {0}")]
    InvalidClockSkew(String),

    #[error("Invalid cache TTL configuration: {0}")]
    InvalidCacheTtl(String),

    #[error("Invalid fetch timeout configuration: {0}")]
    InvalidFetchTimeout(String),

    #[error("Unsupported trusted algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Token verifier configuration.
///
/// Loaded from environment variables with sensible defaults, or built
/// programmatically starting from [`VerifierConfig::new`].
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Identity provider domain or base URL (e.g. "tenant.auth.example.com").
    pub provider_domain: String,

    /// Audience value this service accepts tokens for.
    pub audience: String,

    /// Expected `iss` claim value. Defaults to the provider base URL with a
    /// trailing slash, which is how hosted providers mint it.
    pub issuer: String,

    /// The single signing algorithm trusted for this provider.
    pub algorithm: Algorithm,

    /// How long a fetched key set is considered fresh.
    pub cache_ttl: Duration,

    /// Clock skew tolerance applied to time-based claims.
    pub clock_skew: Duration,

    /// HTTP timeout for key set fetches.
    pub fetch_timeout: Duration,
}

impl VerifierConfig {
    /// Create a configuration with defaults for the given provider and
    /// audience.
    ///
    /// The issuer is derived from the provider domain; override it with
    /// [`VerifierConfig::with_issuer`] when the provider mints a different
    /// `iss` value.
    pub fn new(provider_domain: impl Into<String>, audience: impl Into<String>) -> Self {
        let provider_domain = provider_domain.into();
        let issuer = derive_issuer(&provider_domain);
        Self {
            provider_domain,
            audience: audience.into(),
            issuer,
            algorithm: DEFAULT_ALGORITHM,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            clock_skew: Duration::from_secs(DEFAULT_CLOCK_SKEW_SECONDS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS),
        }
    }

    /// Override the expected `iss` claim value.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Override the trusted signing algorithm.
    ///
    /// Only the algorithms in [`SUPPORTED_ALGORITHMS`] are usable; a
    /// verifier configured with anything else rejects every token with an
    /// algorithm error instead of verifying.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Override the key set cache TTL.
    #[must_use]
    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    /// Override the clock skew tolerance.
    #[must_use]
    pub fn with_clock_skew(mut self, clock_skew: Duration) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Override the key set fetch timeout.
    #[must_use]
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// URL of the provider's published key set.
    #[must_use]
    pub fn jwks_url(&self) -> String {
        format!("{}/.well-known/jwks.json", base_url(&self.provider_domain))
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a required variable is missing or any
    /// value fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a required variable is missing or any
    /// value fails validation.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let provider_domain = vars
            .get("AUTH_PROVIDER_DOMAIN")
            .ok_or_else(|| ConfigError::MissingEnvVar("AUTH_PROVIDER_DOMAIN".to_string()))?
            .clone();

        let audience = vars
            .get("AUTH_AUDIENCE")
            .ok_or_else(|| ConfigError::MissingEnvVar("AUTH_AUDIENCE".to_string()))?
            .clone();

        let issuer = vars
            .get("AUTH_ISSUER")
            .cloned()
            .unwrap_or_else(|| derive_issuer(&provider_domain));

        let algorithm = if let Some(value_str) = vars.get("AUTH_TRUSTED_ALGORITHM") {
            parse_algorithm(value_str)?
        } else {
            DEFAULT_ALGORITHM
        };

        // Parse cache TTL with validation
        let cache_ttl = if let Some(value_str) = vars.get("AUTH_CACHE_TTL_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidCacheTtl(format!(
                    "AUTH_CACHE_TTL_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidCacheTtl(
                    "AUTH_CACHE_TTL_SECONDS must be greater than 0".to_string(),
                ));
            }

            Duration::from_secs(value)
        } else {
            Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS)
        };

        // Parse clock skew tolerance with validation
        let clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidClockSkew(
                    "JWT_CLOCK_SKEW_SECONDS must be greater than 0".to_string(),
                ));
            }

            if value > MAX_CLOCK_SKEW_SECONDS {
                return Err(ConfigError::InvalidClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW_SECONDS, value
                )));
            }

            Duration::from_secs(value)
        } else {
            Duration::from_secs(DEFAULT_CLOCK_SKEW_SECONDS)
        };

        // Parse fetch timeout with validation
        let fetch_timeout = if let Some(value_str) = vars.get("AUTH_FETCH_TIMEOUT_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidFetchTimeout(format!(
                    "AUTH_FETCH_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidFetchTimeout(
                    "AUTH_FETCH_TIMEOUT_SECONDS must be greater than 0".to_string(),
                ));
            }

            Duration::from_secs(value)
        } else {
            Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS)
        };

        Ok(VerifierConfig {
            provider_domain,
            audience,
            issuer,
            algorithm,
            cache_ttl,
            clock_skew,
            fetch_timeout,
        })
    }
}

/// Parse and validate a trusted algorithm name.
fn parse_algorithm(value: &str) -> Result<Algorithm, ConfigError> {
    let algorithm = Algorithm::from_str(value)
        .map_err(|_| ConfigError::UnsupportedAlgorithm(value.to_string()))?;

    if !SUPPORTED_ALGORITHMS.contains(&algorithm) {
        return Err(ConfigError::UnsupportedAlgorithm(value.to_string()));
    }

    Ok(algorithm)
}

/// Normalize a provider domain into a base URL without a trailing slash.
///
/// Bare domains get an `https://` scheme. Values that already carry a
/// scheme are kept as-is, which lets tests point at a local HTTP server.
fn base_url(provider_domain: &str) -> String {
    let trimmed = provider_domain.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Issuer value hosted providers mint: the base URL with a trailing slash.
fn derive_issuer(provider_domain: &str) -> String {
    format!("{}/", base_url(provider_domain))
}
