//! OAuth access token cache and provider.
//!
//! Tokens are obtained with the `client_credentials` grant and cached
//! process-wide, keyed by deployment mode, credential fingerprint, and
//! country code. Multiple client instances can share the same cache via
//! `TokenCache::clone`, so concurrent requests under one credential reuse a
//! single token instead of hammering the authorization endpoint.
//!
//! The cache itself never evicts: freshness is judged by [`TokenProvider`]
//! against the record's stored expiry, with a safety buffer against races
//! between issuance and use.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::credential::Credential;
use crate::error::{Error, Result};

/// Tokens are treated as expired this many seconds before their actual
/// expiry, tolerating clock skew between issuance and use.
pub const EXPIRY_BUFFER_SECS: u64 = 360;

/// Lifetime stamped onto records synthesized from a pre-shared dev token.
const DEV_TOKEN_LIFETIME_SECS: u64 = 3600;

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A cached access token with its issuance metadata.
///
/// `expires_in` is seconds-from-issuance as reported by the authorization
/// endpoint, never an absolute timestamp; expiry is always computed against
/// the locally recorded `issued_at`. Records are replaced wholesale on
/// refresh, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub issued_at: u64,
    pub expires_in: u64,
}

impl TokenRecord {
    pub fn expiry(&self) -> u64 {
        self.issued_at.saturating_add(self.expires_in)
    }

    /// Whether the token is still usable at `now`, accounting for the
    /// expiry buffer.
    pub fn is_fresh(&self, now: u64) -> bool {
        now < self.expiry().saturating_sub(EXPIRY_BUFFER_SECS)
    }
}

/// Shared token store, safe for concurrent readers and writers.
///
/// Cloning yields another handle onto the same store. Individual reads and
/// writes are atomic; there is no cache-side TTL enforcement, so a caller
/// can read a stale record and must re-validate with [`TokenRecord::is_fresh`].
#[derive(Clone, Default)]
pub struct TokenCache {
    inner: Arc<RwLock<HashMap<String, TokenRecord>>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self, key: &str) -> Option<TokenRecord> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn write(&self, key: &str, record: TokenRecord) {
        self.inner.write().await.insert(key.to_string(), record);
    }

    pub async fn delete(&self, key: &str) {
        self.inner.write().await.remove(key);
    }
}

/// Cache key partitioning: clients differing in mode, credential, or country
/// never share a token.
fn cache_key(test_mode: bool, credential: &Credential, country_code: &str) -> String {
    let mode = if test_mode { "sandbox" } else { "live" };
    format!(
        "{}:{}:{}",
        mode,
        credential.fingerprint(),
        country_code.to_lowercase()
    )
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Fetches and refreshes access tokens, backed by a [`TokenCache`].
#[derive(Clone)]
pub struct TokenProvider {
    http: reqwest::Client,
    cache: TokenCache,
    credential: Credential,
    token_url: String,
    cache_key: String,
    dev_access_token: Option<String>,
    refresh_lock: Arc<Mutex<()>>,
}

impl TokenProvider {
    /// `region_base_url` is the country-scoped API origin, e.g.
    /// `https://api-sandbox.ninjavan.co/sg`.
    pub fn new(
        http: reqwest::Client,
        cache: TokenCache,
        credential: Credential,
        region_base_url: &str,
        country_code: &str,
        test_mode: bool,
        dev_access_token: Option<String>,
    ) -> Self {
        Self {
            http,
            cache,
            token_url: format!("{}/2.0/oauth/access_token", region_base_url),
            cache_key: cache_key(test_mode, &credential, country_code),
            credential,
            dev_access_token,
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Return a token valid for immediate use, fetching a fresh one if the
    /// cached record is absent or inside the expiry buffer.
    pub async fn get_valid_token(&self) -> Result<String> {
        if let Some(record) = self.cache.read(&self.cache_key).await
            && record.is_fresh(unix_now())
        {
            return Ok(record.access_token);
        }

        // Serialize refreshes for this provider. Whoever held the lock may
        // already have stored a fresh token while we waited, so double-check
        // before fetching. Concurrent providers sharing the cache key can
        // still race; both fetches produce a valid token.
        let _guard = self.refresh_lock.lock().await;
        if let Some(record) = self.cache.read(&self.cache_key).await
            && record.is_fresh(unix_now())
        {
            tracing::debug!("another task already refreshed the access token");
            return Ok(record.access_token);
        }

        self.fetch_token().await
    }

    /// Unconditionally discard the cached record and fetch a new token.
    ///
    /// Used when the API rejects a token the cache considers valid, which
    /// means its notion of validity is wrong (revoked out-of-band).
    pub async fn force_refresh(&self) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;
        self.cache.delete(&self.cache_key).await;
        self.fetch_token().await
    }

    /// Issue the `client_credentials` grant and store the result.
    async fn fetch_token(&self) -> Result<String> {
        // Dev deployments short-circuit to a pre-shared token instead of
        // calling the network. Same record shape and expiry semantics.
        if let Some(token) = &self.dev_access_token {
            let record = TokenRecord {
                access_token: token.clone(),
                issued_at: unix_now(),
                expires_in: DEV_TOKEN_LIFETIME_SECS,
            };
            self.cache.write(&self.cache_key, record.clone()).await;
            return Ok(record.access_token);
        }

        tracing::debug!(client_id = self.credential.client_id(), "fetching access token");

        let request = TokenRequest {
            client_id: self.credential.client_id(),
            client_secret: self.credential.client_secret(),
            grant_type: "client_credentials",
        };

        let response = self.http.post(&self.token_url).json(&request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::Authentication(body));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        let record = TokenRecord {
            access_token: parsed.access_token,
            issued_at: unix_now(),
            expires_in: parsed.expires_in,
        };
        self.cache.write(&self.cache_key, record.clone()).await;

        tracing::debug!(expires_in = record.expires_in, "access token refreshed");
        Ok(record.access_token)
    }
}
