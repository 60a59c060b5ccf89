//! Verification error types.
//!
//! Every failure path maps to one of the classified kinds here; nothing
//! unclassified crosses the crate boundary. The taxonomy separates "reject
//! the caller" (401) from "system degraded" (503): a token can be bad, or
//! the provider's key set can be unavailable, and callers must be able to
//! tell the two apart.

use thiserror::Error;

/// Failure to retrieve the key set from the identity provider.
///
/// Any variant leaves a previously cached key set untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Connection failure or request timeout.
    #[error("Key set request failed: {0}")]
    Request(String),

    /// Provider answered with a non-success status.
    #[error("Key set endpoint returned status {0}")]
    Status(u16),

    /// Provider answered with a payload that is not a valid key set.
    #[error("Malformed key set payload: {0}")]
    Malformed(String),
}

/// Classified outcome of a failed token verification.
///
/// All variants except [`VerificationError::KeyRetrievalFailed`] mean the
/// token was rejected. `KeyRetrievalFailed` means the verdict is unknown
/// because the provider could not be consulted; the caller is not
/// necessarily at fault.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    /// Token structure could not be parsed (bad framing, oversized,
    /// missing header fields, undecodable claims).
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Declared algorithm is not the single trusted one.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Key identifier absent from a freshly confirmed key set.
    #[error("Unknown key: {0}")]
    UnknownKey(String),

    /// Signature does not verify under the resolved key.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Expiry is in the past beyond the clock skew tolerance.
    #[error("Token expired")]
    TokenExpired,

    /// Issued-at (or not-before) is in the future beyond the clock skew
    /// tolerance.
    #[error("Token not yet valid")]
    TokenNotYetValid,

    /// Issuer claim does not equal the expected issuer.
    #[error("Issuer mismatch")]
    IssuerMismatch,

    /// Audience claim does not contain the expected audience.
    #[error("Audience mismatch")]
    AudienceMismatch,

    /// The provider could not be consulted or returned an unusable key set.
    #[error("Key retrieval failed: {0}")]
    KeyRetrievalFailed(#[from] FetchError),
}

impl VerificationError {
    /// HTTP status code the reporting boundary should answer with.
    ///
    /// Rejected tokens are 401; a failed key retrieval is 503 because the
    /// token was never judged.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            VerificationError::MalformedToken(_)
            | VerificationError::UnsupportedAlgorithm(_)
            | VerificationError::UnknownKey(_)
            | VerificationError::InvalidSignature
            | VerificationError::TokenExpired
            | VerificationError::TokenNotYetValid
            | VerificationError::IssuerMismatch
            | VerificationError::AudienceMismatch => 401,
            VerificationError::KeyRetrievalFailed(_) => 503,
        }
    }
}

/// Classify JWT library failures into the taxonomy.
///
/// `jsonwebtoken` reports signature, time-claim, and structural failures
/// through one error type; this mapping preserves the distinctions the
/// caller needs. Structural decode problems (bad base64, claim shapes the
/// token does not satisfy) fall through to `MalformedToken`.
impl From<jsonwebtoken::errors::Error> for VerificationError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature | ErrorKind::Crypto(_) => {
                VerificationError::InvalidSignature
            }
            ErrorKind::ExpiredSignature => VerificationError::TokenExpired,
            ErrorKind::ImmatureSignature => VerificationError::TokenNotYetValid,
            ErrorKind::InvalidIssuer => VerificationError::IssuerMismatch,
            ErrorKind::InvalidAudience => VerificationError::AudienceMismatch,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                VerificationError::UnsupportedAlgorithm(err.to_string())
            }
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat => VerificationError::KeyRetrievalFailed(
                FetchError::Malformed(format!("unusable signing key: {err}")),
            ),
            _ => VerificationError::MalformedToken(err.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use jsonwebtoken::errors::{Error as JwtError, ErrorKind};

    #[test]
    fn test_display_fetch_request() {
        let error = FetchError::Request("connection refused".to_string());
        assert_eq!(
            format!("{}", error),
            "Key set request failed: connection refused"
        );
    }

    #[test]
    fn test_display_fetch_status() {
        let error = FetchError::Status(502);
        assert_eq!(format!("{}", error), "Key set endpoint returned status 502");
    }

    #[test]
    fn test_display_fetch_malformed() {
        let error = FetchError::Malformed("expected value at line 1".to_string());
        assert_eq!(
            format!("{}", error),
            "Malformed key set payload: expected value at line 1"
        );
    }

    #[test]
    fn test_display_malformed_token() {
        let error = VerificationError::MalformedToken("not compact JWS".to_string());
        assert_eq!(format!("{}", error), "Malformed token: not compact JWS");
    }

    #[test]
    fn test_display_key_retrieval_failed_includes_cause() {
        let error = VerificationError::KeyRetrievalFailed(FetchError::Status(503));
        assert_eq!(
            format!("{}", error),
            "Key retrieval failed: Key set endpoint returned status 503"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            VerificationError::MalformedToken("x".to_string()).status_code(),
            401
        );
        assert_eq!(
            VerificationError::UnsupportedAlgorithm("none".to_string()).status_code(),
            401
        );
        assert_eq!(
            VerificationError::UnknownKey("kid-1".to_string()).status_code(),
            401
        );
        assert_eq!(VerificationError::InvalidSignature.status_code(), 401);
        assert_eq!(VerificationError::TokenExpired.status_code(), 401);
        assert_eq!(VerificationError::TokenNotYetValid.status_code(), 401);
        assert_eq!(VerificationError::IssuerMismatch.status_code(), 401);
        assert_eq!(VerificationError::AudienceMismatch.status_code(), 401);
        assert_eq!(
            VerificationError::KeyRetrievalFailed(FetchError::Status(500)).status_code(),
            503
        );
    }

    #[test]
    fn test_fetch_error_converts_to_key_retrieval_failed() {
        let error: VerificationError = FetchError::Request("timed out".to_string()).into();
        assert!(matches!(
            error,
            VerificationError::KeyRetrievalFailed(FetchError::Request(_))
        ));
    }

    #[test]
    fn test_jwt_error_classification_signature() {
        let error: VerificationError = JwtError::from(ErrorKind::InvalidSignature).into();
        assert_eq!(error, VerificationError::InvalidSignature);
    }

    #[test]
    fn test_jwt_error_classification_expired() {
        let error: VerificationError = JwtError::from(ErrorKind::ExpiredSignature).into();
        assert_eq!(error, VerificationError::TokenExpired);
    }

    #[test]
    fn test_jwt_error_classification_immature() {
        let error: VerificationError = JwtError::from(ErrorKind::ImmatureSignature).into();
        assert_eq!(error, VerificationError::TokenNotYetValid);
    }

    #[test]
    fn test_jwt_error_classification_issuer_and_audience() {
        let issuer: VerificationError = JwtError::from(ErrorKind::InvalidIssuer).into();
        assert_eq!(issuer, VerificationError::IssuerMismatch);

        let audience: VerificationError = JwtError::from(ErrorKind::InvalidAudience).into();
        assert_eq!(audience, VerificationError::AudienceMismatch);
    }

    #[test]
    fn test_jwt_error_classification_algorithm() {
        let error: VerificationError = JwtError::from(ErrorKind::InvalidAlgorithm).into();
        assert!(matches!(
            error,
            VerificationError::UnsupportedAlgorithm(_)
        ));
    }

    #[test]
    fn test_jwt_error_classification_bad_key_material() {
        let error: VerificationError =
            JwtError::from(ErrorKind::InvalidRsaKey("bad modulus".to_string())).into();
        assert!(matches!(
            error,
            VerificationError::KeyRetrievalFailed(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn test_jwt_error_classification_structural_fallback() {
        let error: VerificationError = JwtError::from(ErrorKind::InvalidToken).into();
        assert!(matches!(error, VerificationError::MalformedToken(_)));

        let missing: VerificationError =
            JwtError::from(ErrorKind::MissingRequiredClaim("exp".to_string())).into();
        assert!(matches!(missing, VerificationError::MalformedToken(_)));
    }
}
