// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered hooks around each pipeline attempt.
//!
//! Hooks run once per attempt, in registration order. The first failing hook
//! aborts the remaining hooks of its stage and fails the attempt.

use std::sync::Arc;

use crate::error::{Error, Result, Stage};
use crate::request::{Method, Response};

/// Per-attempt metadata handed to every hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub scope: String,
    pub method: Method,
    pub path: String,
    /// 0-indexed attempt within the retry loop.
    pub attempt: u32,
}

pub type BeforeSend =
    Arc<dyn Fn(&CallContext, &mut reqwest::Request, Option<&serde_json::Value>) -> anyhow::Result<()> + Send + Sync>;
pub type BeforeParse = Arc<dyn Fn(&CallContext, &reqwest::Response) -> anyhow::Result<()> + Send + Sync>;
pub type AfterParse = Arc<dyn Fn(&CallContext, &mut Response) -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone, Default)]
pub struct InterceptorChain {
    before_send: Vec<BeforeSend>,
    before_parse: Vec<BeforeParse>,
    after_parse: Vec<AfterParse>,
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("before_send", &self.before_send.len())
            .field("before_parse", &self.before_parse.len())
            .field("after_parse", &self.after_parse.len())
            .finish()
    }
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.before_send.is_empty() && self.before_parse.is_empty() && self.after_parse.is_empty()
    }

    pub fn before_send<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CallContext, &mut reqwest::Request, Option<&serde_json::Value>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.before_send.push(Arc::new(hook));
        self
    }

    pub fn before_parse<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CallContext, &reqwest::Response) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.before_parse.push(Arc::new(hook));
        self
    }

    pub fn after_parse<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CallContext, &mut Response) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.after_parse.push(Arc::new(hook));
        self
    }

    /// Append every hook of `other` after this chain's hooks.
    pub fn extend(mut self, other: InterceptorChain) -> Self {
        self.before_send.extend(other.before_send);
        self.before_parse.extend(other.before_parse);
        self.after_parse.extend(other.after_parse);
        self
    }

    pub(crate) fn run_before_send(
        &self,
        ctx: &CallContext,
        req: &mut reqwest::Request,
        body: Option<&serde_json::Value>,
    ) -> Result<()> {
        for hook in &self.before_send {
            hook(ctx, req, body).map_err(|source| Error::Interceptor { stage: Stage::BeforeSend, source })?;
        }
        Ok(())
    }

    pub(crate) fn run_before_parse(&self, ctx: &CallContext, resp: &reqwest::Response) -> Result<()> {
        for hook in &self.before_parse {
            hook(ctx, resp).map_err(|source| Error::Interceptor { stage: Stage::BeforeParse, source })?;
        }
        Ok(())
    }

    pub(crate) fn run_after_parse(&self, ctx: &CallContext, resp: &mut Response) -> Result<()> {
        for hook in &self.after_parse {
            hook(ctx, resp).map_err(|source| Error::Interceptor { stage: Stage::AfterParse, source })?;
        }
        Ok(())
    }
}

/// Hooks that log each attempt at debug level. The token never appears in
/// the output.
pub fn trace_hooks() -> InterceptorChain {
    InterceptorChain::new()
        .before_send(|ctx, _req, body| {
            tracing::debug!(
                scope = %ctx.scope,
                method = %ctx.method,
                path = %ctx.path,
                attempt = ctx.attempt,
                has_body = body.is_some(),
                "sending request"
            );
            Ok(())
        })
        .before_parse(|ctx, resp| {
            tracing::debug!(path = %ctx.path, attempt = ctx.attempt, status = resp.status().as_u16(), "response received");
            Ok(())
        })
        .after_parse(|ctx, resp| {
            tracing::debug!(
                path = %ctx.path,
                attempt = ctx.attempt,
                errcode = resp.errcode,
                errmsg = %resp.errmsg,
                "response decoded"
            );
            Ok(())
        })
}

#[cfg(test)]
#[path = "interceptor_tests.rs"]
mod tests;
