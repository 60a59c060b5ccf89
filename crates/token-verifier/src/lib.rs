//! Bearer token verification against a provider's published key set.
//!
//! Two cooperating components:
//!
//! - [`KeySetCache`] fetches the provider's signing keys, caches them with
//!   a TTL, and coalesces concurrent refreshes into a single fetch
//! - [`TokenVerifier`] runs the ordered verification pipeline: structural
//!   parse, algorithm pin, key resolution, signature, time claims, issuer,
//!   and audience
//!
//! Rejections carry a [`VerificationError`] naming the first check that
//! failed, with an HTTP status mapping that separates caller faults (401)
//! from provider faults (503).
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use token_verifier::{KeySetCache, TokenVerifier, VerifierConfig};
//!
//! let config = VerifierConfig::new("tenant.auth.example.com", "https://api.example.com");
//! let key_set = Arc::new(KeySetCache::from_config(&config));
//! let verifier = TokenVerifier::new(key_set, &config);
//!
//! let claims = verifier.verify(bearer_token).await?;
//! println!("token issued by {} for {:?}", claims.iss, claims.aud);
//! ```

#![warn(clippy::pedantic)]

/// Module for verified token claims
pub mod claims;

/// Module for verifier configuration
pub mod config;

/// Module for error types with HTTP status code mapping
pub mod errors;

/// Module for the key set cache
pub mod jwks;

/// Module for structural token parsing
pub mod jwt;

/// Module for the verification pipeline
pub mod verifier;

pub use claims::{Audience, TokenClaims};
pub use config::{ConfigError, VerifierConfig};
pub use errors::{FetchError, VerificationError};
pub use jwks::{KeySet, KeySetCache, SigningKey};
pub use verifier::TokenVerifier;
