// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the token cache, the request pipeline, and the retry loop.
//!
//! Remote failures arrive as an `errcode`/`errmsg` pair inside the response
//! envelope. They are carried as [`ApiError`] and classified by [`category_of`],
//! which is the only place numeric codes are compared.

use std::fmt;

/// The WeCom "system busy, retry later" code.
pub const CODE_BUSY: i64 = -1;
/// `access_token` is malformed or was issued for another secret.
pub const CODE_INVALID_TOKEN: i64 = 40014;
/// `access_token` query parameter is missing.
pub const CODE_MISSING_TOKEN: i64 = 41001;
/// `access_token` has expired on the remote side.
pub const CODE_EXPIRED_TOKEN: i64 = 42001;
/// API call frequency exceeded.
pub const CODE_FREQ_LIMIT: i64 = 45009;
/// API called too often for the same target.
pub const CODE_TOO_FREQUENT: i64 = 45011;
/// Concurrent call limit exceeded.
pub const CODE_CONCURRENCY_LIMIT: i64 = 45033;

/// Retry category of a remote error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// The token is expired, malformed, or missing. Refresh, then retry.
    TokenInvalid,
    /// The caller is being throttled.
    RateLimited,
    /// The remote side is temporarily busy.
    Busy,
    /// Everything else. Terminal.
    Other,
}

impl Category {
    pub fn is_retriable(&self) -> bool {
        !matches!(self, Self::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenInvalid => "token_invalid",
            Self::RateLimited => "rate_limited",
            Self::Busy => "busy",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a remote error code.
pub fn category_of(code: i64) -> Category {
    match code {
        CODE_INVALID_TOKEN | CODE_MISSING_TOKEN | CODE_EXPIRED_TOKEN => Category::TokenInvalid,
        CODE_FREQ_LIMIT | CODE_TOO_FREQUENT | CODE_CONCURRENCY_LIMIT => Category::RateLimited,
        CODE_BUSY => Category::Busy,
        _ => Category::Other,
    }
}

/// A non-zero `errcode` returned inside a response envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("api error {code}: {message}")]
pub struct ApiError {
    pub code: i64,
    pub message: String,
}

impl ApiError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn category(&self) -> Category {
        category_of(self.code)
    }
}

/// Interceptor stage a hook failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    BeforeSend,
    BeforeParse,
    AfterParse,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BeforeSend => "before_send",
            Self::BeforeParse => "before_parse",
            Self::AfterParse => "after_parse",
        })
    }
}

/// Marker produced when a cancellation token fires during a blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Errors returned by the credential manager and the request pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("secret not found for scope {scope:?}")]
    SecretNotFound { scope: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("empty access_token returned for scope {scope:?}")]
    EmptyToken { scope: String },

    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache {op} failed for {key}: {source}")]
    Cache {
        op: &'static str,
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{stage} interceptor failed: {source}")]
    Interceptor {
        stage: Stage,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn transport(context: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport { context: context.into(), source }
    }

    pub fn decode(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode { context: context.into(), source }
    }

    /// The remote error code, if this error carries one.
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Api(api) => Some(api.code),
            _ => None,
        }
    }

    pub fn is_code(&self, code: i64) -> bool {
        self.code() == Some(code)
    }

    pub fn category(&self) -> Option<Category> {
        self.code().map(category_of)
    }

    /// Whether the retry loop may try again after this error.
    ///
    /// Only classified remote codes are retriable. Transport, decode,
    /// configuration, and cancellation errors are terminal.
    pub fn is_retriable(&self) -> bool {
        self.category().is_some_and(|c| c.is_retriable())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Extract a remote error code from anywhere in an error's `source()` chain.
///
/// Works through `anyhow` and other wrappers as long as the chain reaches an
/// [`Error`] or [`ApiError`].
pub fn code_of(err: &(dyn std::error::Error + 'static)) -> Option<i64> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(api) = e.downcast_ref::<ApiError>() {
            return Some(api.code);
        }
        if let Some(code) = e.downcast_ref::<Error>().and_then(Error::code) {
            return Some(code);
        }
        current = e.source();
    }
    None
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
