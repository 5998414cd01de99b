// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token cache: key -> (token, absolute expiry).
//!
//! [`TokenCache`] is the pluggable seam for external stores. Entries are
//! replaced whole on every `set`; readers never see a partially written entry.

use std::collections::HashMap;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::RwLock;

/// A cached token and the instant it stops being usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: SystemTime,
}

impl CachedToken {
    pub fn new(token: impl Into<String>, expires_at: SystemTime) -> Self {
        Self { token: token.into(), expires_at }
    }

    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(SystemTime::now())
    }
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit(CachedToken),
    /// Never set, or deleted.
    NotFound,
    /// Present, but `now >= expires_at`.
    Expired,
}

impl Lookup {
    /// The token if it is still usable.
    pub fn usable(self) -> Option<CachedToken> {
        match self {
            Self::Hit(entry) if !entry.is_expired() => Some(entry),
            _ => None,
        }
    }
}

/// Storage for access tokens.
///
/// Implementations may fold `Expired` into `NotFound`; callers treat both as
/// a miss.
#[async_trait]
pub trait TokenCache: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Lookup>;

    /// Replace any existing entry for `key`.
    async fn set(&self, key: &str, token: &str, expires_at: SystemTime) -> anyhow::Result<()>;

    /// Remove `key`. Absent keys are not an error.
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// Process-local cache. The default.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CachedToken>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Raw entry for `key`, expired or not.
    pub fn peek(&self, key: &str) -> Option<CachedToken> {
        self.entries.read().get(key).cloned()
    }
}

#[async_trait]
impl TokenCache for MemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Lookup> {
        let entries = self.entries.read();
        Ok(match entries.get(key) {
            None => Lookup::NotFound,
            Some(entry) if entry.is_expired() => Lookup::Expired,
            Some(entry) => Lookup::Hit(entry.clone()),
        })
    }

    async fn set(&self, key: &str, token: &str, expires_at: SystemTime) -> anyhow::Result<()> {
        self.entries.write().insert(key.to_owned(), CachedToken::new(token, expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
