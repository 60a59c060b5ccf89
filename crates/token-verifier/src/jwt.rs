//! Raw-token structural utilities.
//!
//! Everything here operates on unverified token text: size capping,
//! compact-serialization splitting, and header decoding. Nothing in this
//! module proves authenticity; the header fields it returns are only good
//! for selecting a key and pinning the algorithm before real verification.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE any base64 or JSON work (DoS prevention)
//! - The decoded header is untrusted input; `kid` is only a lookup handle
//!   into a trusted key set and `alg` is only compared against the one
//!   trusted algorithm

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use thiserror::Error;

/// Maximum allowed token size in bytes (8KB).
///
/// Oversized tokens are rejected before any parsing or cryptographic
/// operations. Typical tokens are 200-800 bytes; the limit leaves room for
/// providers that embed large claim sets while still bounding the work an
/// unauthenticated caller can cause.
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192; // 8KB

/// Errors from structural token parsing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenParseError {
    /// Token exceeds [`MAX_TOKEN_SIZE_BYTES`].
    #[error("token exceeds {MAX_TOKEN_SIZE_BYTES} bytes")]
    TokenTooLarge,

    /// Not three dot-separated parts, or the header part is not
    /// base64url-encoded JSON.
    #[error("invalid token structure")]
    InvalidStructure,

    /// Header carries no usable `alg` field.
    #[error("token header missing alg")]
    MissingAlgorithm,

    /// Header carries no usable `kid` field.
    #[error("token header missing kid")]
    MissingKid,
}

/// Unverified JOSE header fields needed before signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Declared signing algorithm, exactly as written in the token.
    pub alg: String,

    /// Key identifier naming which published key signed the token.
    pub kid: String,
}

/// Decode the unverified header of `token`.
///
/// Checks the size cap, splits the compact serialization, and decodes the
/// header part, returning its `alg` and `kid`. Empty and non-string values
/// are rejected the same as absent ones.
///
/// # Errors
///
/// Returns a [`TokenParseError`] describing the first structural defect:
/// oversize, bad framing or encoding, or a missing header field.
pub fn decode_token_header(token: &str) -> Result<TokenHeader, TokenParseError> {
    // Check token size first (DoS prevention)
    if token.len() > MAX_TOKEN_SIZE_BYTES {
        tracing::debug!(
            target: "token_verifier.jwt",
            token_size = token.len(),
            max_size = MAX_TOKEN_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(TokenParseError::TokenTooLarge);
    }

    // Compact serialization: header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        tracing::debug!(
            target: "token_verifier.jwt",
            parts = parts.len(),
            "Token rejected: not compact JWS"
        );
        return Err(TokenParseError::InvalidStructure);
    }

    let header_part = parts.first().ok_or(TokenParseError::InvalidStructure)?;
    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "token_verifier.jwt", error = %e, "Failed to decode token header base64");
        TokenParseError::InvalidStructure
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "token_verifier.jwt", error = %e, "Failed to parse token header JSON");
        TokenParseError::InvalidStructure
    })?;

    let alg = header
        .get("alg")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(TokenParseError::MissingAlgorithm)?;

    // Reject empty kid values; an empty lookup handle is never valid
    let kid = header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .ok_or(TokenParseError::MissingKid)?;

    Ok(TokenHeader { alg, kid })
}
