// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential lifecycle: scope resolution, token caching, single-flight refresh.
//!
//! A scope is a named credential context (a WeCom application) with its own
//! secret. The empty scope name is the default scope.

pub mod cache;
pub mod fetch;
pub mod manager;

use std::collections::HashMap;

use crate::config::ScopeConfig;
use crate::error::{Error, Result};

pub use cache::{CachedToken, Lookup, MemoryCache, TokenCache};
pub use manager::CredentialManager;

/// Name of the default scope.
pub const DEFAULT_SCOPE: &str = "";

/// A registered credential scope. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialScope {
    pub name: String,
    pub secret: String,
    pub agent_id: Option<i64>,
}

impl From<ScopeConfig> for CredentialScope {
    fn from(config: ScopeConfig) -> Self {
        Self { name: config.name, secret: config.secret, agent_id: config.agent_id }
    }
}

/// Outcome of resolving a requested scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved<'a> {
    /// The scope the token is cached and locked under.
    pub scope: &'a str,
    pub secret: &'a str,
}

/// All scopes known to one tenant.
#[derive(Debug, Clone, Default)]
pub struct Scopes {
    default_secret: Option<String>,
    by_name: HashMap<String, CredentialScope>,
}

impl Scopes {
    pub fn new(default_secret: Option<String>, scopes: Vec<ScopeConfig>) -> Self {
        let by_name = scopes
            .into_iter()
            .map(|s| (s.name.clone(), CredentialScope::from(s)))
            .collect();
        Self { default_secret: default_secret.filter(|s| !s.is_empty()), by_name }
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty() && self.default_secret.is_none()
    }

    /// Resolve `requested` to a secret.
    ///
    /// Order: the top-level secret, then the sole registered scope, then a
    /// lookup by name.
    pub fn resolve(&self, requested: &str) -> Result<Resolved<'_>> {
        if let Some(ref secret) = self.default_secret {
            return Ok(Resolved { scope: DEFAULT_SCOPE, secret: secret.as_str() });
        }
        let scope = if self.by_name.len() == 1 {
            self.by_name.values().next()
        } else {
            self.by_name.get(requested)
        };
        match scope {
            Some(s) if !s.secret.is_empty() => Ok(Resolved { scope: &s.name, secret: &s.secret }),
            _ => Err(Error::SecretNotFound { scope: requested.to_owned() }),
        }
    }

    /// Numeric agent id of `requested`, if it is a registered scope.
    ///
    /// The default scope maps to the sole registered scope when there is one.
    pub fn agent_id(&self, requested: &str) -> Option<i64> {
        let scope = match self.by_name.get(requested) {
            Some(s) => Some(s),
            None if requested == DEFAULT_SCOPE && self.by_name.len() == 1 => {
                self.by_name.values().next()
            }
            None => None,
        };
        scope.and_then(|s| s.agent_id)
    }
}

/// Cache key for a tenant/scope pair.
pub fn cache_key(corp_id: &str, scope: &str) -> String {
    format!("wecom:access_token:{corp_id}:{scope}")
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
