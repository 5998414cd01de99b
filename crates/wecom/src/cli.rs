// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wecom` command line: fetch a token or run one API call.

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::config::ClientConfig;
use crate::error::Cancelled;
use crate::interceptor::trace_hooks;
use crate::request::{Method, Request};

#[derive(Debug, Parser)]
#[command(name = "wecom", version, about = "WeCom server API client")]
pub struct Cli {
    #[command(flatten)]
    pub config: ClientConfig,

    /// Log every attempt at debug level.
    #[arg(long, env = "WECOM_TRACE")]
    pub trace: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print a valid access token
    Token {
        /// Scope name (omit for the default scope)
        #[arg(long, default_value = "")]
        scope: String,
    },
    /// Run one API call and print the raw response body
    Call {
        /// get or post
        method: Method,
        /// API path, e.g. /cgi-bin/user/get
        path: String,
        /// Query parameter as key=value (repeatable)
        #[arg(long = "query", value_parser = parse_pair)]
        query: Vec<(String, String)>,
        /// JSON request body
        #[arg(long)]
        body: Option<String>,
        #[arg(long, default_value = "")]
        scope: String,
    },
}

pub fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_owned(), v.to_owned())),
        _ => Err(format!("expected key=value, got {s:?}")),
    }
}

/// Run one command. Ctrl-C cancels any pending wait.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut builder = Client::builder(cli.config);
    if cli.trace {
        builder = builder.interceptors(trace_hooks());
    }
    let client = builder.build()?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted");
            interrupt.cancel();
        }
    });

    match cli.command {
        Command::Token { scope } => {
            let scoped = client.scope(scope);
            let token = tokio::select! {
                _ = cancel.cancelled() => return Err(Cancelled.into()),
                token = scoped.token() => token?,
            };
            println!("{token}");
        }
        Command::Call { method, path, query, body, scope } => {
            let mut request = Request::new(method, path);
            for (k, v) in query {
                request = request.query(k, v);
            }
            if let Some(body) = body {
                request = request.body(serde_json::from_str(&body).context("parse --body")?);
            }
            let resp = client.scope(scope).execute_with_cancel(&request, &cancel).await?;
            println!("{}", String::from_utf8_lossy(resp.body()));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
