// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WeCom server API client core: access-token lifecycle, request pipeline,
//! retry with capped exponential backoff, and interceptor hooks.

pub mod cli;
pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod request;
pub mod retry;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::{Client, ClientBuilder, ScopedClient};
pub use config::{ClientConfig, ScopeConfig, ScopesFile};
pub use credential::{CredentialManager, MemoryCache, TokenCache};
pub use error::{code_of, ApiError, Category, Error, Result};
pub use interceptor::{CallContext, InterceptorChain};
pub use request::{Method, Request, Response};
pub use retry::{RetryExecutor, RetryPolicy};
