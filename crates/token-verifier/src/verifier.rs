//! Token verification pipeline.
//!
//! Verifies bearer tokens against provider signing keys resolved through
//! the key set cache. Checks run in a fixed order and stop at the first
//! failure, so every rejection reports the most specific applicable kind.
//!
//! # Security
//!
//! - Tokens are size-checked before any parsing (DoS prevention)
//! - Only the single configured algorithm is accepted; the token's own
//!   header never influences which verification is performed
//! - Expiration and issued-at claims are validated with clock skew tolerance
//! - Issuer must match exactly; the expected audience must be among the
//!   claimed ones

use crate::claims::TokenClaims;
use crate::config::VerifierConfig;
use crate::errors::{FetchError, VerificationError};
use crate::jwks::{KeySetCache, SigningKey};
use crate::jwt::decode_token_header;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Token verifier bound to one provider, audience, and algorithm.
pub struct TokenVerifier {
    /// Source of provider signing keys.
    key_set: Arc<KeySetCache>,

    /// Expected `iss` claim value.
    issuer: String,

    /// Audience this service accepts tokens for.
    audience: String,

    /// The single signing algorithm trusted for this provider.
    algorithm: Algorithm,

    /// Clock skew tolerance for time-based claims.
    clock_skew: Duration,
}

impl TokenVerifier {
    /// Create a new verifier sharing an existing key set cache.
    ///
    /// # Arguments
    ///
    /// * `key_set` - Cache the verifier resolves signing keys through
    /// * `config` - Issuer, audience, algorithm, and skew settings
    pub fn new(key_set: Arc<KeySetCache>, config: &VerifierConfig) -> Self {
        Self {
            key_set,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            algorithm: config.algorithm,
            clock_skew: config.clock_skew,
        }
    }

    /// Create a verifier with its own key set cache from configuration.
    #[must_use]
    pub fn from_config(config: &VerifierConfig) -> Self {
        Self::new(Arc::new(KeySetCache::from_config(config)), config)
    }

    /// Verify a bearer token and return its claims.
    ///
    /// # Verification Order
    ///
    /// 1. Structural parse of the unverified header
    /// 2. Declared algorithm must equal the configured one
    /// 3. Signing key resolved by `kid` through the cache
    /// 4. Signature verification
    /// 5. Time claims (`exp`, `nbf`, `iat`) with clock skew tolerance
    /// 6. Issuer exact match
    /// 7. Expected audience among the claimed audiences
    ///
    /// # Arguments
    ///
    /// * `token` - The compact-serialized token to verify
    ///
    /// # Errors
    ///
    /// Returns the [`VerificationError`] for the first check that failed.
    #[instrument(skip_all)]
    pub async fn verify(&self, token: &str) -> Result<TokenClaims, VerificationError> {
        // 1. Structural parse of the unverified header
        let header = decode_token_header(token).map_err(|e| {
            tracing::debug!(target: "token_verifier.verifier", error = ?e, "Token header parsing failed");
            VerificationError::MalformedToken(e.to_string())
        })?;

        // 2. Pin the declared algorithm to the one trusted value. "none"
        // and symmetric algorithms fail here no matter what the key set
        // contains.
        match Algorithm::from_str(&header.alg) {
            Ok(declared) if declared == self.algorithm => {}
            _ => {
                tracing::warn!(
                    target: "token_verifier.verifier",
                    alg = %header.alg,
                    "Token declared an untrusted algorithm"
                );
                return Err(VerificationError::UnsupportedAlgorithm(header.alg));
            }
        }

        // 3. Resolve the signing key through the cache
        let key = self
            .key_set
            .lookup(&header.kid)
            .await?
            .ok_or_else(|| VerificationError::UnknownKey(header.kid.clone()))?;

        // 4.-5. Verify signature, expiry, and not-before
        let claims = self.verify_signed_token(token, &key)?;

        // 5. The decode step does not bound `iat`; check it here
        validate_issued_at(claims.iat, self.clock_skew)?;

        // 6. Issuer must match exactly
        if claims.iss != self.issuer {
            tracing::debug!(target: "token_verifier.verifier", "Token issuer mismatch");
            return Err(VerificationError::IssuerMismatch);
        }

        // 7. Expected audience must be among the claimed ones
        if !claims.aud.contains(&self.audience) {
            tracing::debug!(target: "token_verifier.verifier", "Token audience mismatch");
            return Err(VerificationError::AudienceMismatch);
        }

        tracing::debug!(target: "token_verifier.verifier", "Token verified successfully");
        Ok(claims)
    }

    /// Verify the signature and time claims of a token against one key.
    fn verify_signed_token(
        &self,
        token: &str,
        key: &SigningKey,
    ) -> Result<TokenClaims, VerificationError> {
        let decoding_key = resolve_decoding_key(key, self.algorithm)?;

        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = self.clock_skew.as_secs();
        // Issuer and audience are checked after decoding so each mismatch
        // reports its own kind
        validation.validate_aud = false;

        let token_data = decode::<TokenClaims>(token, &decoding_key, &validation).map_err(|e| {
            tracing::debug!(target: "token_verifier.verifier", error = %e, "Token verification failed");
            VerificationError::from(e)
        })?;

        Ok(token_data.claims)
    }
}

/// Convert a published signing key into a decoding key for `algorithm`.
///
/// A key whose declared `alg` or key type does not fit the trusted
/// algorithm is rejected as an invalid signature: the token named a real
/// key, but that key must never verify under this configuration. Key
/// material that is absent or undecodable is a provider-side fault and is
/// reported as a retrieval failure instead.
fn resolve_decoding_key(
    key: &SigningKey,
    algorithm: Algorithm,
) -> Result<DecodingKey, VerificationError> {
    if let Some(key_alg) = &key.alg {
        let matches_trusted = Algorithm::from_str(key_alg).is_ok_and(|a| a == algorithm);
        if !matches_trusted {
            tracing::warn!(
                target: "token_verifier.verifier",
                kid = %key.kid,
                alg = %key_alg,
                "Signing key published for a different algorithm"
            );
            return Err(VerificationError::InvalidSignature);
        }
    }

    match algorithm {
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => {
            if key.kty != "RSA" {
                tracing::warn!(
                    target: "token_verifier.verifier",
                    kid = %key.kid,
                    kty = %key.kty,
                    "Unexpected key type for RSA verification"
                );
                return Err(VerificationError::InvalidSignature);
            }

            let n = key.n.as_ref().ok_or_else(|| missing_material(key, "n"))?;
            let e = key.e.as_ref().ok_or_else(|| missing_material(key, "e"))?;

            DecodingKey::from_rsa_components(n, e).map_err(|err| {
                tracing::error!(
                    target: "token_verifier.verifier",
                    kid = %key.kid,
                    error = %err,
                    "Unusable RSA key material"
                );
                VerificationError::KeyRetrievalFailed(FetchError::Malformed(format!(
                    "unusable RSA key material for kid {}",
                    key.kid
                )))
            })
        }
        Algorithm::EdDSA => {
            if key.kty != "OKP" {
                tracing::warn!(
                    target: "token_verifier.verifier",
                    kid = %key.kid,
                    kty = %key.kty,
                    "Unexpected key type for Ed25519 verification"
                );
                return Err(VerificationError::InvalidSignature);
            }

            let x = key.x.as_ref().ok_or_else(|| missing_material(key, "x"))?;

            DecodingKey::from_ed_components(x).map_err(|err| {
                tracing::error!(
                    target: "token_verifier.verifier",
                    kid = %key.kid,
                    error = %err,
                    "Unusable Ed25519 key material"
                );
                VerificationError::KeyRetrievalFailed(FetchError::Malformed(format!(
                    "unusable Ed25519 key material for kid {}",
                    key.kid
                )))
            })
        }
        other => {
            tracing::warn!(
                target: "token_verifier.verifier",
                algorithm = ?other,
                "Algorithm not usable for key set verification"
            );
            Err(VerificationError::UnsupportedAlgorithm(format!("{other:?}")))
        }
    }
}

/// Build the error for a signing key missing a required material field.
fn missing_material(key: &SigningKey, field: &str) -> VerificationError {
    tracing::error!(
        target: "token_verifier.verifier",
        kid = %key.kid,
        field = %field,
        "Signing key missing required field"
    );
    VerificationError::KeyRetrievalFailed(FetchError::Malformed(format!(
        "signing key {} missing {} field",
        key.kid, field
    )))
}

/// Reject tokens whose `iat` lies further in the future than the skew
/// tolerance allows.
fn validate_issued_at(iat: i64, clock_skew: Duration) -> Result<(), VerificationError> {
    validate_issued_at_at(iat, clock_skew, chrono::Utc::now().timestamp())
}

fn validate_issued_at_at(
    iat: i64,
    clock_skew: Duration,
    now: i64,
) -> Result<(), VerificationError> {
    let skew = i64::try_from(clock_skew.as_secs()).unwrap_or(i64::MAX);
    let max_iat = now.saturating_add(skew);
    if iat > max_iat {
        tracing::debug!(
            target: "token_verifier.verifier",
            iat = iat,
            max_iat = max_iat,
            "Token issued in the future"
        );
        return Err(VerificationError::TokenNotYetValid);
    }
    Ok(())
}
