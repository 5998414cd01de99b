// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request pipeline: token injection, interceptors, envelope decoding, and
//! retry with forced refresh on token-invalid errors.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::credential::{CredentialManager, MemoryCache, TokenCache, DEFAULT_SCOPE};
use crate::error::{Cancelled, Category, Error, Result};
use crate::interceptor::{CallContext, InterceptorChain};
use crate::request::{Request, Response};
use crate::retry::{is_retriable, RetryExecutor, RetryPolicy};

/// Assembles a [`Client`] from configuration and optional collaborators.
pub struct ClientBuilder {
    config: ClientConfig,
    cache: Option<Arc<dyn TokenCache>>,
    http: Option<reqwest::Client>,
    interceptors: InterceptorChain,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self { config, cache: None, http: None, interceptors: InterceptorChain::new() }
    }

    /// Use `cache` instead of a fresh in-process [`MemoryCache`].
    pub fn cache(mut self, cache: Arc<dyn TokenCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use a preconfigured HTTP client. The configured timeout is not applied.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn interceptors(mut self, chain: InterceptorChain) -> Self {
        self.interceptors = self.interceptors.extend(chain);
        self
    }

    pub fn build(self) -> Result<Client> {
        // The scopes file is read once; validation and the manager share the result.
        let scopes = self.config.resolved_scopes()?;
        self.config.validate_with(&scopes)?;
        let http = match self.http {
            Some(http) => http,
            None => crate::http::build_client(self.config.timeout())?,
        };
        let cache = self.cache.unwrap_or_else(|| Arc::new(MemoryCache::new()));
        let credentials = Arc::new(CredentialManager::new(&self.config, scopes, http.clone(), cache));
        let policy = RetryPolicy::new(self.config.initial_backoff(), self.config.max_backoff())?;

        tracing::debug!(
            corp_id = %self.config.corp_id,
            base_url = %self.config.base(),
            max_retries = self.config.max_retries,
            "wecom client ready"
        );
        Ok(Client {
            inner: Arc::new(Inner {
                base_url: self.config.base().to_owned(),
                http,
                credentials,
                retry: RetryExecutor::new(self.config.max_retries, policy),
                interceptors: self.interceptors,
                shutdown: CancellationToken::new(),
            }),
        })
    }
}

struct Inner {
    base_url: String,
    http: reqwest::Client,
    credentials: Arc<CredentialManager>,
    retry: RetryExecutor,
    interceptors: InterceptorChain,
    shutdown: CancellationToken,
}

/// Client for one tenant. Cheap to clone; clones share tokens and locks.
///
/// Calls made through `Client` use the default scope. Use [`Client::scope`]
/// for a named application.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        ClientBuilder::new(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.inner.credentials
    }

    /// A handle that runs calls against the named scope.
    pub fn scope(&self, name: impl Into<String>) -> ScopedClient {
        ScopedClient { client: self.clone(), scope: name.into() }
    }

    /// Cancel every in-flight call started through [`Client::execute`].
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    pub async fn token(&self) -> Result<String> {
        self.inner.credentials.get_token(DEFAULT_SCOPE).await
    }

    pub async fn execute(&self, request: &Request) -> Result<Response> {
        self.call(DEFAULT_SCOPE, request, &self.inner.shutdown).await
    }

    /// Like [`Client::execute`], but observes `cancel` instead of the
    /// client's shutdown token.
    pub async fn execute_with_cancel(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        self.call(DEFAULT_SCOPE, request, cancel).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        self.execute(&get_request(path, query)).await?.json()
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(&Request::post(path).json(body)?).await?.json()
    }

    async fn call(&self, scope: &str, request: &Request, cancel: &CancellationToken) -> Result<Response> {
        if cancel.is_cancelled() {
            return Err(Cancelled.into());
        }
        self.inner
            .retry
            .run(cancel, is_retriable, move |attempt| self.attempt(scope, request, attempt, cancel))
            .await
    }

    /// One pass through the pipeline. Never loops; retries belong to the
    /// surrounding executor.
    async fn attempt(
        &self,
        scope: &str,
        request: &Request,
        attempt: u32,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let inner = &*self.inner;
        let token = inner.credentials.get_token(scope).await?;
        let ctx = CallContext {
            scope: scope.to_owned(),
            method: request.method(),
            path: request.path().to_owned(),
            attempt,
        };

        let mut outgoing = request.build(&inner.http, &inner.base_url, &token)?;
        inner.interceptors.run_before_send(&ctx, &mut outgoing, request.payload())?;

        let context = format!("{} {}", ctx.method, ctx.path);
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled.into()),
            // The URL carries the token; keep it out of the error.
            r = inner.http.execute(outgoing) => r.map_err(|e| Error::transport(&context, e.without_url()))?,
        };
        inner.interceptors.run_before_parse(&ctx, &resp)?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(|e| Error::transport(&context, e.without_url()))?;
        let mut parsed = Response::parse(status, headers, body)?;
        inner.interceptors.run_after_parse(&ctx, &mut parsed)?;

        let Some(api) = parsed.api_error() else {
            return Ok(parsed);
        };
        if api.category() == Category::TokenInvalid {
            tracing::info!(scope, code = api.code, path = %ctx.path, "token rejected, refreshing");
            if let Err(e) = inner.credentials.force_refresh(scope).await {
                tracing::warn!(scope, err = %e, "forced refresh failed");
            }
        } else {
            tracing::debug!(scope, code = api.code, category = %api.category(), path = %ctx.path, "api error");
        }
        Err(api.into())
    }
}

/// A [`Client`] bound to one named scope.
#[derive(Clone)]
pub struct ScopedClient {
    client: Client,
    scope: String,
}

impl ScopedClient {
    pub fn name(&self) -> &str {
        &self.scope
    }

    /// The scope's numeric agent id, for filling `agentid` request fields.
    pub fn agent_id(&self) -> Option<i64> {
        self.client.inner.credentials.agent_id(&self.scope)
    }

    pub async fn token(&self) -> Result<String> {
        self.client.inner.credentials.get_token(&self.scope).await
    }

    pub async fn execute(&self, request: &Request) -> Result<Response> {
        self.client.call(&self.scope, request, &self.client.inner.shutdown).await
    }

    pub async fn execute_with_cancel(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        self.client.call(&self.scope, request, cancel).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        self.execute(&get_request(path, query)).await?.json()
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(&Request::post(path).json(body)?).await?.json()
    }
}

fn get_request(path: &str, query: &[(&str, &str)]) -> Request {
    query.iter().fold(Request::get(path), |req, (k, v)| req.query(*k, v))
}
