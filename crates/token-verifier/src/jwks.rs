//! Key set client for fetching and caching provider signing keys.
//!
//! Keys are fetched from the provider's `/.well-known/jwks.json` endpoint
//! and cached with a configurable TTL. Refreshes are demand-driven: nothing
//! runs in the background, and a refresh happens only when a lookup cannot
//! be answered from a fresh snapshot or a caller asks for one.
//!
//! # Security
//!
//! - Keys are cached to reduce load on the provider and improve latency
//! - A failed refresh never discards previously fetched keys
//! - Concurrent refreshes coalesce into a single fetch so a burst of
//!   cold-cache requests cannot stampede the provider
//! - HTTPS should be used in production (enforced by deployment config)

use crate::config::{VerifierConfig, DEFAULT_CACHE_TTL_SECONDS, DEFAULT_FETCH_TIMEOUT_SECONDS};
use crate::errors::FetchError;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// A single public signing key from the provider's key set.
///
/// Carries the union of the fields RSA and Ed25519 keys publish. Which
/// fields must be present depends on `kty` and is enforced when the key is
/// converted for verification, not here.
#[derive(Debug, Clone, Deserialize)]
pub struct SigningKey {
    /// Key type ("RSA" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// Algorithm the provider intends this key for (e.g. "RS256").
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" for signing). Carried but not enforced.
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url encoded).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url encoded).
    #[serde(default)]
    pub e: Option<String>,

    /// Curve name ("Ed25519" for EdDSA keys).
    #[serde(default)]
    pub crv: Option<String>,

    /// Ed25519 public key value (base64url encoded).
    #[serde(default)]
    pub x: Option<String>,
}

/// Key set document as published by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct KeySet {
    /// List of public signing keys.
    pub keys: Vec<SigningKey>,
}

/// An immutable view of the key set taken at fetch time.
struct KeySetSnapshot {
    /// Map of key ID to signing key.
    keys: HashMap<String, SigningKey>,

    /// When this snapshot stops being fresh.
    expires_at: Instant,
}

/// Bookkeeping for coalescing concurrent refreshes.
///
/// `completed` counts finished fetch attempts. A task that observed count
/// N before waiting for the slot and finds it at N+1 afterwards knows
/// another task already did the work, and adopts that attempt's outcome
/// from `last_error` instead of fetching again.
struct RefreshSlot {
    /// Number of completed fetch attempts.
    completed: u64,

    /// Outcome of the most recent attempt (`None` means it succeeded).
    last_error: Option<FetchError>,
}

/// Cache of provider signing keys with demand-driven refresh.
///
/// Thread-safe. Lookups share a read lock on the current snapshot;
/// concurrent refreshes coalesce so N simultaneous cold-cache lookups
/// cause exactly one fetch, with every waiter receiving that fetch's
/// outcome. A failed refresh leaves the previous snapshot in place.
pub struct KeySetCache {
    /// URL to the provider's key set endpoint.
    jwks_url: String,

    /// HTTP client for fetching the key set.
    http_client: reqwest::Client,

    /// Current key set snapshot, `None` until the first successful fetch.
    snapshot: RwLock<Option<KeySetSnapshot>>,

    /// How long a snapshot stays fresh.
    cache_ttl: Duration,

    /// Serializes fetch attempts and records their outcomes.
    refresh_slot: Mutex<RefreshSlot>,

    /// Mirror of `RefreshSlot::completed`, readable without the lock.
    refresh_seq: AtomicU64,
}

impl KeySetCache {
    /// Create a new key set cache with the default TTL.
    ///
    /// # Arguments
    ///
    /// * `jwks_url` - URL to the provider's key set endpoint
    pub fn new(jwks_url: String) -> Self {
        Self::with_ttl(jwks_url, Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS))
    }

    /// Create a new key set cache with a custom TTL.
    ///
    /// # Arguments
    ///
    /// * `jwks_url` - URL to the provider's key set endpoint
    /// * `cache_ttl` - How long a fetched key set is considered fresh
    pub fn with_ttl(jwks_url: String, cache_ttl: Duration) -> Self {
        Self::with_ttl_and_timeout(
            jwks_url,
            cache_ttl,
            Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS),
        )
    }

    /// Create a key set cache from verifier configuration.
    #[must_use]
    pub fn from_config(config: &VerifierConfig) -> Self {
        Self::with_ttl_and_timeout(config.jwks_url(), config.cache_ttl, config.fetch_timeout)
    }

    fn with_ttl_and_timeout(jwks_url: String, cache_ttl: Duration, fetch_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "token_verifier.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
            snapshot: RwLock::new(None),
            cache_ttl,
            refresh_slot: Mutex::new(RefreshSlot {
                completed: 0,
                last_error: None,
            }),
            refresh_seq: AtomicU64::new(0),
        }
    }

    /// Look up a signing key by key ID.
    ///
    /// A key present in the snapshot is returned regardless of snapshot
    /// age; a known key from a stale snapshot beats refusing to verify. A
    /// fresh snapshot without the key answers `None` authoritatively. Only
    /// when the snapshot is stale (or was never fetched) and cannot answer
    /// does this trigger a refresh, after which the lookup is retried once.
    ///
    /// # Arguments
    ///
    /// * `kid` - Key ID to look up
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if the key set had to be refreshed and the
    /// fetch failed.
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn lookup(&self, kid: &str) -> Result<Option<SigningKey>, FetchError> {
        // Check the current snapshot first
        {
            let snapshot = self.snapshot.read().await;
            if let Some(snap) = snapshot.as_ref() {
                if let Some(key) = snap.keys.get(kid) {
                    tracing::debug!(target: "token_verifier.jwks", kid = %kid, "Key set cache hit");
                    return Ok(Some(key.clone()));
                }
                if snap.expires_at > Instant::now() {
                    // Fresh snapshot without the kid: authoritative miss
                    tracing::debug!(target: "token_verifier.jwks", kid = %kid, "Key not found in fresh key set");
                    return Ok(None);
                }
            }
        }

        // Stale or never fetched: refresh and retry once
        self.refresh_if_stale().await?;

        let snapshot = self.snapshot.read().await;
        if let Some(snap) = snapshot.as_ref() {
            if let Some(key) = snap.keys.get(kid) {
                return Ok(Some(key.clone()));
            }
        }

        // Key not found even after refresh
        tracing::warn!(target: "token_verifier.jwks", kid = %kid, "Key not found in key set after refresh");
        Ok(None)
    }

    /// Refresh the key set now.
    ///
    /// Always fetches, regardless of snapshot freshness; useful when the
    /// provider signals a rotation out of band. Coalesces with a refresh
    /// already in flight rather than stacking a second fetch behind it.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] if the fetch fails. The previous snapshot
    /// stays in place.
    pub async fn refresh(&self) -> Result<(), FetchError> {
        self.coalesced_refresh(false).await
    }

    /// Refresh unless another task already produced a fresh snapshot.
    async fn refresh_if_stale(&self) -> Result<(), FetchError> {
        self.coalesced_refresh(true).await
    }

    /// Run one coalesced fetch attempt.
    ///
    /// Tasks that were waiting while an attempt completed adopt its outcome
    /// instead of fetching again, so N concurrent callers produce exactly
    /// one request and all see the same result.
    async fn coalesced_refresh(&self, skip_if_fresh: bool) -> Result<(), FetchError> {
        let observed = self.refresh_seq.load(Ordering::Acquire);
        let mut slot = self.refresh_slot.lock().await;

        // An attempt completed while this task waited for the slot
        if slot.completed != observed {
            return match &slot.last_error {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            };
        }

        if skip_if_fresh && self.snapshot_is_fresh().await {
            return Ok(());
        }

        let result = self.fetch_key_set().await;
        slot.completed = slot.completed.wrapping_add(1);
        self.refresh_seq.store(slot.completed, Ordering::Release);
        slot.last_error = result.as_ref().err().cloned();
        result
    }

    async fn snapshot_is_fresh(&self) -> bool {
        let snapshot = self.snapshot.read().await;
        snapshot
            .as_ref()
            .is_some_and(|snap| snap.expires_at > Instant::now())
    }

    /// Fetch the key set from the provider and swap in a new snapshot.
    #[instrument(skip(self))]
    async fn fetch_key_set(&self) -> Result<(), FetchError> {
        tracing::debug!(target: "token_verifier.jwks", url = %self.jwks_url, "Fetching key set from provider");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "token_verifier.jwks", error = %e, "Failed to fetch key set");
                FetchError::Request(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                target: "token_verifier.jwks",
                status = %status,
                "Key set endpoint returned error"
            );
            return Err(FetchError::Status(status.as_u16()));
        }

        let key_set: KeySet = response.json().await.map_err(|e| {
            tracing::error!(target: "token_verifier.jwks", error = %e, "Failed to parse key set response");
            FetchError::Malformed(e.to_string())
        })?;

        // Build key map; a duplicated kid resolves to its last occurrence
        let keys: HashMap<String, SigningKey> = key_set
            .keys
            .into_iter()
            .map(|key| (key.kid.clone(), key))
            .collect();

        tracing::info!(
            target: "token_verifier.jwks",
            key_count = keys.len(),
            "Key set cache refreshed"
        );

        // Swap in the new snapshot only after a fully successful fetch
        let mut snapshot = self.snapshot.write().await;
        *snapshot = Some(KeySetSnapshot {
            keys,
            expires_at: Instant::now() + self.cache_ttl,
        });

        Ok(())
    }
}
