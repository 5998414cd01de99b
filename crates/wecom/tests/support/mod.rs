// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process fake of the WeCom API for integration tests.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, Method, Uri};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use wecom::ClientConfig;

pub const CORP_ID: &str = "ww-test";
pub const SECRET: &str = "corp-secret";

/// One API request as the server saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Recorded {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
pub struct FakeState {
    pub token_fetches: AtomicU32,
    pub api_calls: AtomicU32,
    /// Reported `expires_in` for issued tokens.
    pub expires_in: AtomicI64,
    /// Non-zero makes `gettoken` fail with this code.
    pub token_errcode: AtomicI64,
    pub token_delay: Mutex<Duration>,
    pub empty_token: Mutex<bool>,
    /// Errcodes returned by successive API calls before they succeed.
    pub script: Mutex<VecDeque<i64>>,
    pub valid: Mutex<HashSet<String>>,
    pub secrets_seen: Mutex<Vec<String>>,
    pub requests: Mutex<Vec<Recorded>>,
}

impl FakeState {
    pub fn token_fetches(&self) -> u32 {
        self.token_fetches.load(Ordering::SeqCst)
    }

    pub fn api_calls(&self) -> u32 {
        self.api_calls.load(Ordering::SeqCst)
    }

    pub fn script(&self, codes: impl IntoIterator<Item = i64>) {
        self.script.lock().extend(codes);
    }

    /// Reject every token issued so far with 42001.
    pub fn expire_all(&self) {
        self.valid.lock().clear();
    }

    pub fn last_request(&self) -> Option<Recorded> {
        self.requests.lock().last().cloned()
    }
}

pub struct FakeWecom {
    pub base_url: String,
    pub state: Arc<FakeState>,
}

impl FakeWecom {
    pub async fn start() -> anyhow::Result<Self> {
        let state = Arc::new(FakeState::default());
        state.expires_in.store(7200, Ordering::SeqCst);

        let app = Router::new()
            .route("/cgi-bin/gettoken", get(gettoken))
            .route("/cgi-bin/html", get(|| async { "<html>bad gateway</html>" }))
            .fallback(api)
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self { base_url: format!("http://{addr}"), state })
    }

    /// Config with the default secret and millisecond backoff.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(CORP_ID)
            .with_secret(SECRET)
            .with_base_url(self.base_url.clone())
            .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
    }
}

async fn gettoken(
    State(state): State<Arc<FakeState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Json<Value> {
    let delay = *state.token_delay.lock();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let n = state.token_fetches.fetch_add(1, Ordering::SeqCst) + 1;
    let secret = params
        .iter()
        .find(|(k, _)| k == "corpsecret")
        .map(|(_, v)| v.clone())
        .unwrap_or_default();
    state.secrets_seen.lock().push(secret.clone());

    let errcode = state.token_errcode.load(Ordering::SeqCst);
    if errcode != 0 {
        return Json(json!({"errcode": errcode, "errmsg": "scripted token failure"}));
    }
    if *state.empty_token.lock() {
        return Json(json!({"errcode": 0, "errmsg": "ok", "access_token": "", "expires_in": 7200}));
    }
    let token = format!("{secret}-tok-{n}");
    state.valid.lock().insert(token.clone());
    Json(json!({
        "errcode": 0,
        "errmsg": "ok",
        "access_token": token,
        "expires_in": state.expires_in.load(Ordering::SeqCst),
    }))
}

async fn api(
    State(state): State<Arc<FakeState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let n = state.api_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let query: Vec<(String, String)> = reqwest::Url::parse(&format!("http://fake{uri}"))
        .map(|u| u.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect())
        .unwrap_or_default();
    let recorded = Recorded { method, path: uri.path().to_owned(), query, headers, body };
    let token = recorded.param("access_token").unwrap_or_default().to_owned();
    state.requests.lock().push(recorded);

    if token.is_empty() {
        return Json(json!({"errcode": 41001, "errmsg": "access_token missing"}));
    }
    if !state.valid.lock().contains(&token) {
        return Json(json!({"errcode": 42001, "errmsg": "access_token expired"}));
    }
    if let Some(code) = state.script.lock().pop_front().filter(|c| *c != 0) {
        return Json(json!({"errcode": code, "errmsg": "scripted failure"}));
    }
    Json(json!({"errcode": 0, "errmsg": "ok", "call": n, "token": token}))
}
