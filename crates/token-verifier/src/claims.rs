//! Verified token claims.
//!
//! Contains the claims extracted from verified tokens. The `sub` field is
//! redacted in Debug output to prevent exposure in logs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The `aud` claim: a single audience string or a list of them.
///
/// Providers emit both shapes, so both deserialize transparently. Membership
/// is what matters for verification, see [`Audience::contains`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    /// A single audience value.
    One(String),

    /// Multiple audience values.
    Many(Vec<String>),
}

impl Audience {
    /// Check whether `audience` is among the claimed audiences.
    #[must_use]
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::One(aud) => aud == audience,
            Audience::Many(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

/// Claims carried by a verified token.
///
/// The `sub` field contains user or client identifiers which should not
/// be exposed in logs. A custom Debug implementation redacts this field.
/// Provider-specific claims beyond the mandatory set are preserved in
/// `extra` and reachable through [`TokenClaims::get`].
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user or client identifier) - redacted in Debug output.
    pub sub: String,

    /// Issuer that minted the token.
    pub iss: String,

    /// Intended audience(s) of the token.
    pub aud: Audience,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    pub iat: i64,

    /// All other claims the provider included, unvalidated.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Custom Debug implementation that redacts the `sub` field.
///
/// Extra claims are reduced to their names; their values may carry
/// anything the provider put there and are not safe to log either.
impl fmt::Debug for TokenClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let extra_keys: Vec<&str> = self.extra.keys().map(String::as_str).collect();
        f.debug_struct("TokenClaims")
            .field("sub", &"[REDACTED]")
            .field("iss", &self.iss)
            .field("aud", &self.aud)
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("extra_keys", &extra_keys)
            .finish()
    }
}

impl TokenClaims {
    /// Look up a non-mandatory claim by name.
    ///
    /// Returns `None` for the mandatory claims (`sub`, `iss`, `aud`, `exp`,
    /// `iat`), which live in their own typed fields.
    #[must_use]
    pub fn get(&self, claim: &str) -> Option<&serde_json::Value> {
        self.extra.get(claim)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_claims() -> TokenClaims {
        let mut extra = serde_json::Map::new();
        extra.insert("scope".to_string(), json!("read write"));
        extra.insert("azp".to_string(), json!("client-abc"));

        TokenClaims {
            sub: "auth0|secret-user-id".to_string(),
            iss: "https://tenant.example.com/".to_string(),
            aud: Audience::One("https://api.example.com".to_string()),
            exp: 1_234_567_890,
            iat: 1_234_567_800,
            extra,
        }
    }

    #[test]
    fn test_claims_debug_redacts_sub() {
        let claims = sample_claims();

        let debug_str = format!("{:?}", claims);

        assert!(
            !debug_str.contains("secret-user-id"),
            "Debug output should not contain actual sub value"
        );
        assert!(
            debug_str.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
    }

    #[test]
    fn test_claims_debug_hides_extra_values() {
        let claims = sample_claims();

        let debug_str = format!("{:?}", claims);

        assert!(
            debug_str.contains("scope"),
            "Debug output should name extra claims"
        );
        assert!(
            !debug_str.contains("client-abc"),
            "Debug output should not contain extra claim values"
        );
    }

    #[test]
    fn test_audience_contains_single() {
        let aud = Audience::One("https://api.example.com".to_string());

        assert!(aud.contains("https://api.example.com"));
        assert!(!aud.contains("https://other.example.com"));
        assert!(!aud.contains("https://api.example")); // Partial match should not work
    }

    #[test]
    fn test_audience_contains_list() {
        let aud = Audience::Many(vec![
            "https://api.example.com".to_string(),
            "https://admin.example.com".to_string(),
        ]);

        assert!(aud.contains("https://api.example.com"));
        assert!(aud.contains("https://admin.example.com"));
        assert!(!aud.contains("https://other.example.com"));
    }

    #[test]
    fn test_audience_empty_list_contains_nothing() {
        let aud = Audience::Many(vec![]);
        assert!(!aud.contains("https://api.example.com"));
    }

    #[test]
    fn test_audience_deserializes_from_string() {
        let aud: Audience = serde_json::from_value(json!("https://api.example.com")).unwrap();
        assert_eq!(aud, Audience::One("https://api.example.com".to_string()));
    }

    #[test]
    fn test_audience_deserializes_from_array() {
        let aud: Audience =
            serde_json::from_value(json!(["https://api.example.com", "other"])).unwrap();
        assert_eq!(
            aud,
            Audience::Many(vec![
                "https://api.example.com".to_string(),
                "other".to_string()
            ])
        );
    }

    #[test]
    fn test_claims_deserialization_captures_extra() {
        let payload = json!({
            "sub": "user123",
            "iss": "https://tenant.example.com/",
            "aud": "https://api.example.com",
            "exp": 1_234_567_890,
            "iat": 1_234_567_800,
            "scope": "read write",
            "permissions": ["read:items"]
        });

        let claims: TokenClaims = serde_json::from_value(payload).unwrap();

        assert_eq!(claims.sub, "user123");
        assert_eq!(claims.get("scope"), Some(&json!("read write")));
        assert_eq!(claims.get("permissions"), Some(&json!(["read:items"])));
        assert_eq!(claims.get("nonexistent"), None);
    }

    #[test]
    fn test_claims_get_does_not_expose_mandatory_fields() {
        let claims = sample_claims();

        assert_eq!(claims.get("sub"), None);
        assert_eq!(claims.get("iss"), None);
        assert_eq!(claims.get("exp"), None);
    }

    #[test]
    fn test_claims_serialization_round_trip() {
        let claims = sample_claims();

        let json = serde_json::to_string(&claims).unwrap();
        let deserialized: TokenClaims = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.sub, claims.sub);
        assert_eq!(deserialized.iss, claims.iss);
        assert_eq!(deserialized.aud, claims.aud);
        assert_eq!(deserialized.exp, claims.exp);
        assert_eq!(deserialized.iat, claims.iat);
        assert_eq!(deserialized.extra, claims.extra);
    }

    #[test]
    fn test_claims_missing_mandatory_field_fails() {
        let payload = json!({
            "sub": "user123",
            "iss": "https://tenant.example.com/",
            "exp": 1_234_567_890,
            "iat": 1_234_567_800
        });

        let result: Result<TokenClaims, _> = serde_json::from_value(payload);
        assert!(result.is_err(), "claims without aud should not deserialize");
    }
}
