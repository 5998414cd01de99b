// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request pipeline against the fake server: token injection, envelope
//! handling, retries, interceptors, and cancellation.

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use support::FakeWecom;
use wecom::error::{Stage, CODE_BUSY};
use wecom::{Client, Error, InterceptorChain, Request};

#[derive(Debug, Deserialize)]
struct Echo {
    call: u32,
    token: String,
}

#[tokio::test]
async fn token_travels_as_the_last_query_parameter() -> anyhow::Result<()> {
    let fake = FakeWecom::start().await?;
    let client = Client::new(fake.config())?;

    let echo: Echo = client.get_json("/cgi-bin/user/get", &[("userid", "zhang san")]).await?;
    let token = client.token().await?;
    assert_eq!(echo.token, token);
    assert_eq!(echo.call, 1);

    let seen = fake.state.last_request().ok_or_else(|| anyhow::anyhow!("no request"))?;
    assert_eq!(seen.method, axum::http::Method::GET);
    assert_eq!(seen.path, "/cgi-bin/user/get");
    assert_eq!(
        seen.query,
        vec![("userid".to_owned(), "zhang san".to_owned()), ("access_token".to_owned(), token)]
    );
    assert!(seen.headers.get("authorization").is_none());
    Ok(())
}

#[tokio::test]
async fn post_body_is_json_with_content_type() -> anyhow::Result<()> {
    let fake = FakeWecom::start().await?;
    let client = Client::new(fake.config())?;

    let payload = json!({"touser": "@all", "msgtype": "text", "text": {"content": "hi"}});
    let _: Value = client.post_json("/cgi-bin/message/send", &payload).await?;

    let seen = fake.state.last_request().ok_or_else(|| anyhow::anyhow!("no request"))?;
    assert_eq!(seen.method, axum::http::Method::POST);
    assert_eq!(
        seen.headers.get("content-type").and_then(|v| v.to_str().ok()),
        Some("application/json; charset=utf-8")
    );
    assert_eq!(serde_json::from_slice::<Value>(&seen.body)?, payload);
    Ok(())
}

#[tokio::test]
async fn expired_token_forces_one_refresh_then_succeeds() -> anyhow::Result<()> {
    let fake = FakeWecom::start().await?;
    let client = Client::new(fake.config())?;

    let stale = client.token().await?;
    fake.state.expire_all();

    let echo: Echo = client.get_json("/cgi-bin/department/list", &[]).await?;
    assert_ne!(echo.token, stale);
    assert_eq!(fake.state.token_fetches(), 2);
    assert_eq!(fake.state.api_calls(), 2);
    assert_eq!(client.token().await?, echo.token);
    Ok(())
}

#[tokio::test]
async fn scripted_token_invalid_code_triggers_exactly_one_refresh() -> anyhow::Result<()> {
    let fake = FakeWecom::start().await?;
    fake.state.script([40014]);
    let client = Client::new(fake.config())?;

    let resp = client.execute(&Request::get("/cgi-bin/agent/get")).await?;
    assert!(resp.is_success());
    assert_eq!(fake.state.token_fetches(), 2);
    assert_eq!(fake.state.api_calls(), 2);
    Ok(())
}

#[tokio::test]
async fn rate_limit_is_retried_without_refresh() -> anyhow::Result<()> {
    let fake = FakeWecom::start().await?;
    fake.state.script([45009, 45033]);
    let client = Client::new(fake.config())?;

    let resp = client.execute(&Request::get("/cgi-bin/user/list")).await?;
    assert!(resp.is_success());
    assert_eq!(fake.state.api_calls(), 3);
    assert_eq!(fake.state.token_fetches(), 1);
    Ok(())
}

#[tokio::test]
async fn retriable_errors_exhaust_after_max_retries() -> anyhow::Result<()> {
    let fake = FakeWecom::start().await?;
    fake.state.script([CODE_BUSY; 10]);
    let client = Client::new(fake.config().with_max_retries(3))?;

    let err = client.execute(&Request::get("/cgi-bin/user/list")).await.err();
    assert!(err.is_some_and(|e| e.is_code(CODE_BUSY)));
    assert_eq!(fake.state.api_calls(), 4);
    Ok(())
}

#[tokio::test]
async fn terminal_code_is_returned_after_one_call() -> anyhow::Result<()> {
    let fake = FakeWecom::start().await?;
    fake.state.script([60011]);
    let client = Client::new(fake.config())?;

    let err = client.execute(&Request::get("/cgi-bin/user/get")).await.err();
    let err = err.ok_or_else(|| anyhow::anyhow!("expected error"))?;
    assert!(err.is_code(60011));
    let wrapped = anyhow::Error::from(err).context("lookup user");
    assert_eq!(wecom::code_of(&*wrapped), Some(60011));
    assert_eq!(fake.state.api_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn retriable_token_fetch_failure_is_retried() -> anyhow::Result<()> {
    let fake = FakeWecom::start().await?;
    fake.state.token_errcode.store(CODE_BUSY, Ordering::SeqCst);
    let client = Client::new(fake.config().with_max_retries(2))?;

    let err = client.execute(&Request::get("/cgi-bin/user/get")).await.err();
    assert!(err.is_some_and(|e| e.is_code(CODE_BUSY)));
    assert_eq!(fake.state.token_fetches(), 3);
    assert_eq!(fake.state.api_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn non_json_body_is_a_terminal_decode_error() -> anyhow::Result<()> {
    let fake = FakeWecom::start().await?;
    let client = Client::new(fake.config())?;

    let err = client.execute(&Request::get("/cgi-bin/html")).await.err();
    assert!(matches!(err, Some(Error::Decode { .. })));
    Ok(())
}

#[tokio::test]
async fn interceptors_see_each_attempt_in_order() -> anyhow::Result<()> {
    let fake = FakeWecom::start().await?;
    fake.state.script([CODE_BUSY]);
    let log = Arc::new(Mutex::new(Vec::new()));
    let (send_log, parse_log, after_log) = (log.clone(), log.clone(), log.clone());
    let chain = InterceptorChain::new()
        .before_send(move |ctx, req, _| {
            send_log.lock().push(format!("send:{}", ctx.attempt));
            req.headers_mut().insert("x-request-attempt", ctx.attempt.into());
            Ok(())
        })
        .before_parse(move |ctx, resp| {
            parse_log.lock().push(format!("parse:{}:{}", ctx.attempt, resp.status().as_u16()));
            Ok(())
        })
        .after_parse(move |ctx, resp| {
            after_log.lock().push(format!("after:{}:{}", ctx.attempt, resp.errcode));
            Ok(())
        });
    let client = Client::builder(fake.config()).interceptors(chain).build()?;

    client.execute(&Request::get("/cgi-bin/user/list")).await?;
    assert_eq!(
        *log.lock(),
        vec!["send:0", "parse:0:200", "after:0:-1", "send:1", "parse:1:200", "after:1:0"]
    );
    let seen = fake.state.last_request().ok_or_else(|| anyhow::anyhow!("no request"))?;
    assert_eq!(seen.headers.get("x-request-attempt").and_then(|v| v.to_str().ok()), Some("1"));
    Ok(())
}

#[tokio::test]
async fn failing_hook_aborts_the_attempt_before_sending() -> anyhow::Result<()> {
    let fake = FakeWecom::start().await?;
    let chain = InterceptorChain::new().before_send(|_, _, _| anyhow::bail!("blocked by policy"));
    let client = Client::builder(fake.config()).interceptors(chain).build()?;

    let err = client.execute(&Request::get("/cgi-bin/user/list")).await.err();
    assert!(matches!(err, Some(Error::Interceptor { stage: Stage::BeforeSend, .. })));
    assert_eq!(fake.state.api_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn after_parse_hook_can_clear_an_error() -> anyhow::Result<()> {
    let fake = FakeWecom::start().await?;
    fake.state.script([60011]);
    let chain = InterceptorChain::new().after_parse(|_, resp| {
        if resp.errcode == 60011 {
            resp.errcode = 0;
            resp.set_body(r#"{"errcode":0,"errmsg":"ok","call":0,"token":"masked"}"#);
        }
        Ok(())
    });
    let client = Client::builder(fake.config()).interceptors(chain).build()?;

    let echo: Echo = client.get_json("/cgi-bin/user/get", &[]).await?;
    assert_eq!(echo.token, "masked");
    assert_eq!(fake.state.api_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn scoped_calls_use_the_scope_token() -> anyhow::Result<()> {
    let fake = FakeWecom::start().await?;
    let config = wecom::ClientConfig::new(support::CORP_ID)
        .with_base_url(fake.base_url.clone())
        .with_scope(wecom::ScopeConfig::new("hr", "hr-secret"))
        .with_scope(wecom::ScopeConfig::new("notify", "notify-secret").with_agent_id(42));
    let client = Client::new(config)?;

    let notify = client.scope("notify");
    let body = json!({"agentid": notify.agent_id(), "touser": "@all"});
    let echo: Echo = notify.post_json("/cgi-bin/message/send", &body).await?;
    assert!(echo.token.starts_with("notify-secret-tok-"));

    let echo: Echo = client.scope("hr").get_json("/cgi-bin/user/get", &[]).await?;
    assert!(echo.token.starts_with("hr-secret-tok-"));
    Ok(())
}

#[tokio::test]
async fn cancellation_during_backoff_wins() -> anyhow::Result<()> {
    let fake = FakeWecom::start().await?;
    fake.state.script([CODE_BUSY; 10]);
    let config = fake.config().with_backoff(Duration::from_secs(10), Duration::from_secs(10));
    let client = Client::new(config)?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = client.execute_with_cancel(&Request::get("/cgi-bin/user/list"), &cancel).await.err();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(err.is_some_and(|e| e.is_cancelled()));
    assert_eq!(fake.state.api_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn shutdown_cancels_pending_calls() -> anyhow::Result<()> {
    let fake = FakeWecom::start().await?;
    fake.state.script([CODE_BUSY; 10]);
    let config = fake.config().with_backoff(Duration::from_secs(10), Duration::from_secs(10));
    let client = Client::new(config)?;

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.execute(&Request::get("/cgi-bin/user/list")).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.shutdown();

    let result = tokio::time::timeout(Duration::from_secs(5), pending).await??;
    assert!(result.is_err_and(|e| e.is_cancelled()));
    assert!(client.is_shutdown());

    let again = client.execute(&Request::get("/cgi-bin/user/list")).await;
    assert!(again.is_err_and(|e| e.is_cancelled()));
    Ok(())
}
