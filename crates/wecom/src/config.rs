// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the WeCom client.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Tenant (corp) identifier.
    #[arg(long, env = "WECOM_CORP_ID")]
    pub corp_id: String,

    /// Default scope secret. Takes precedence over registered scopes.
    #[arg(long, env = "WECOM_CORP_SECRET", hide_env_values = true)]
    pub corp_secret: Option<String>,

    /// Path to a JSON file listing named scopes and their secrets.
    #[arg(long, env = "WECOM_SCOPES_FILE")]
    pub scopes_file: Option<PathBuf>,

    /// Base URL of the remote API.
    #[arg(long, default_value = "https://qyapi.weixin.qq.com", env = "WECOM_BASE_URL")]
    pub base_url: String,

    /// HTTP timeout in milliseconds, applied to token fetches and API calls.
    #[arg(long, default_value_t = 10_000, env = "WECOM_TIMEOUT_MS")]
    pub timeout_ms: u64,

    /// Retries after the first attempt for retriable remote errors.
    #[arg(long, default_value_t = 3, env = "WECOM_MAX_RETRIES")]
    pub max_retries: u32,

    /// Backoff before the first retry, in milliseconds. Doubles per retry.
    #[arg(long, default_value_t = 1_000, env = "WECOM_INITIAL_BACKOFF_MS")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the retry backoff, in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "WECOM_MAX_BACKOFF_MS")]
    pub max_backoff_ms: u64,

    /// Seconds subtracted from a token's reported lifetime before caching.
    #[arg(long, default_value_t = 300, env = "WECOM_TOKEN_MARGIN_SECS")]
    pub token_margin_secs: u64,

    /// Scopes registered in code (merged with `scopes_file`).
    #[arg(skip)]
    pub scopes: Vec<ScopeConfig>,
}

/// A named credential scope (a WeCom "agent").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeConfig {
    pub name: String,
    pub secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<i64>,
}

impl ScopeConfig {
    pub fn new(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { name: name.into(), secret: secret.into(), agent_id: None }
    }

    pub fn with_agent_id(mut self, agent_id: i64) -> Self {
        self.agent_id = Some(agent_id);
        self
    }
}

/// On-disk format of `--scopes-file`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScopesFile {
    #[serde(default)]
    pub scopes: Vec<ScopeConfig>,
}

impl ScopesFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("read {}: {e}", path.display())))?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::decode(format!("parse {}", path.display()), e))
    }
}

impl ClientConfig {
    /// Config with defaults for everything but the tenant id.
    pub fn new(corp_id: impl Into<String>) -> Self {
        Self {
            corp_id: corp_id.into(),
            corp_secret: None,
            scopes_file: None,
            base_url: "https://qyapi.weixin.qq.com".to_owned(),
            timeout_ms: 10_000,
            max_retries: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            token_margin_secs: 300,
            scopes: vec![],
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.corp_secret = Some(secret.into());
        self
    }

    pub fn with_scope(mut self, scope: ScopeConfig) -> Self {
        self.scopes.push(scope);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff_ms = initial.as_millis() as u64;
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn token_margin(&self) -> Duration {
        Duration::from_secs(self.token_margin_secs)
    }

    /// Base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Code-registered scopes followed by those from `scopes_file`.
    pub fn resolved_scopes(&self) -> Result<Vec<ScopeConfig>> {
        let mut scopes = self.scopes.clone();
        if let Some(ref path) = self.scopes_file {
            scopes.extend(ScopesFile::load(path)?.scopes);
        }
        Ok(scopes)
    }

    /// Check the configuration before any network activity.
    pub fn validate(&self) -> Result<()> {
        self.validate_with(&self.resolved_scopes()?)
    }

    /// Like [`ClientConfig::validate`], against scopes already resolved by
    /// [`ClientConfig::resolved_scopes`]. The scopes file is not read.
    pub fn validate_with(&self, scopes: &[ScopeConfig]) -> Result<()> {
        if self.corp_id.trim().is_empty() {
            return Err(Error::config("corp id must not be empty"));
        }
        let has_default = self.corp_secret.as_deref().is_some_and(|s| !s.is_empty());
        if !has_default && scopes.is_empty() {
            return Err(Error::config("either a corp secret or at least one scope is required"));
        }
        let mut seen = HashSet::new();
        for scope in scopes {
            if scope.name.is_empty() {
                return Err(Error::config("scope name must not be empty"));
            }
            if scope.secret.is_empty() {
                return Err(Error::config(format!("scope {:?} has an empty secret", scope.name)));
            }
            if !seen.insert(scope.name.as_str()) {
                return Err(Error::config(format!("duplicate scope {:?}", scope.name)));
            }
        }
        reqwest::Url::parse(self.base())
            .map_err(|e| Error::config(format!("invalid base url {:?}: {e}", self.base_url)))?;
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(Error::config(format!(
                "initial backoff {}ms exceeds max backoff {}ms",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
