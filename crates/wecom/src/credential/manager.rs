// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential manager: serves cached tokens and refreshes them single-flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use crate::config::{ClientConfig, ScopeConfig};
use crate::credential::cache::TokenCache;
use crate::credential::fetch::fetch_token;
use crate::credential::{cache_key, Scopes};
use crate::error::{Error, Result};

/// Per-scope refresh locks, created lazily and kept for the manager's lifetime.
type LockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

/// Owns the scopes of one tenant and keeps their tokens fresh.
pub struct CredentialManager {
    corp_id: String,
    base_url: String,
    scopes: Scopes,
    cache: Arc<dyn TokenCache>,
    http: reqwest::Client,
    margin: Duration,
    /// Guards only lazy creation; the per-scope locks are acquired outside it.
    locks: Mutex<LockMap>,
}

impl CredentialManager {
    /// `scopes` are the already-resolved registered scopes
    /// (see [`ClientConfig::resolved_scopes`]).
    pub fn new(
        config: &ClientConfig,
        scopes: Vec<ScopeConfig>,
        http: reqwest::Client,
        cache: Arc<dyn TokenCache>,
    ) -> Self {
        let scopes = Scopes::new(config.corp_secret.clone(), scopes);
        Self {
            corp_id: config.corp_id.clone(),
            base_url: config.base().to_owned(),
            scopes,
            cache,
            http,
            margin: config.token_margin(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn agent_id(&self, scope: &str) -> Option<i64> {
        self.scopes.agent_id(scope)
    }

    /// Cache key the token for `scope` is stored under.
    pub fn cache_key(&self, scope: &str) -> Result<String> {
        let resolved = self.scopes.resolve(scope)?;
        Ok(cache_key(&self.corp_id, resolved.scope))
    }

    /// Return a usable token for `scope`, fetching one if the cache misses.
    pub async fn get_token(&self, scope: &str) -> Result<String> {
        let resolved = self.scopes.resolve(scope)?;
        let key = cache_key(&self.corp_id, resolved.scope);

        if let Some(token) = self.cached(&key).await? {
            tracing::debug!(scope = resolved.scope, "token cache hit");
            return Ok(token);
        }
        tracing::debug!(scope = resolved.scope, "token cache miss");

        let lock = self.refresh_lock(resolved.scope);
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(token) = self.cached(&key).await? {
            tracing::debug!(scope = resolved.scope, "token refreshed by concurrent caller");
            return Ok(token);
        }
        self.refresh(resolved.scope, resolved.secret, &key).await
    }

    /// Fetch a new token for `scope` regardless of what the cache holds.
    pub async fn force_refresh(&self, scope: &str) -> Result<String> {
        let resolved = self.scopes.resolve(scope)?;
        let key = cache_key(&self.corp_id, resolved.scope);

        let lock = self.refresh_lock(resolved.scope);
        let _guard = lock.lock().await;
        tracing::info!(scope = resolved.scope, "forcing token refresh");
        self.refresh(resolved.scope, resolved.secret, &key).await
    }

    /// Drop the cached token for `scope`.
    pub async fn invalidate(&self, scope: &str) -> Result<()> {
        let key = self.cache_key(scope)?;
        self.cache
            .delete(&key)
            .await
            .map_err(|source| Error::Cache { op: "delete", key, source })
    }

    fn refresh_lock(&self, scope: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        Arc::clone(locks.entry(scope.to_owned()).or_default())
    }

    async fn cached(&self, key: &str) -> Result<Option<String>> {
        let lookup = self.cache.get(key).await.map_err(|source| Error::Cache {
            op: "get",
            key: key.to_owned(),
            source,
        })?;
        Ok(lookup.usable().map(|entry| entry.token))
    }

    /// Fetch and cache a token. Caller must hold the scope's refresh lock.
    async fn refresh(&self, scope: &str, secret: &str, key: &str) -> Result<String> {
        tracing::debug!(scope, "fetching access token");
        let fetched_at = SystemTime::now();
        let resp = match fetch_token(&self.http, &self.base_url, &self.corp_id, secret).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(scope, err = %e, "token refresh failed");
                return Err(e);
            }
        };
        if resp.access_token.is_empty() {
            tracing::warn!(scope, "token endpoint returned an empty token");
            return Err(Error::EmptyToken { scope: scope.to_owned() });
        }

        let expires_at = token_expiry(fetched_at, resp.expires_in, self.margin);
        self.cache.set(key, &resp.access_token, expires_at).await.map_err(|source| {
            Error::Cache { op: "set", key: key.to_owned(), source }
        })?;
        tracing::info!(scope, expires_in = resp.expires_in, "access token refreshed");
        Ok(resp.access_token)
    }
}

/// Longest lifetime accepted from the token endpoint. Larger values are clamped.
pub const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Expiry instant for a token fetched at `fetched_at` with the reported
/// lifetime, shortened by `margin`.
///
/// Lifetimes shorter than the margin yield an instant at or before
/// `fetched_at`, so the token is never served from cache. An expiry that
/// does not fit in `SystemTime` is treated the same way.
pub fn token_expiry(fetched_at: SystemTime, expires_in_secs: i64, margin: Duration) -> SystemTime {
    let lifetime = Duration::from_secs(expires_in_secs.max(0).unsigned_abs()).min(MAX_TOKEN_LIFETIME);
    if lifetime >= margin {
        fetched_at.checked_add(lifetime - margin).unwrap_or(fetched_at)
    } else {
        fetched_at.checked_sub(margin - lifetime).unwrap_or(fetched_at)
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
