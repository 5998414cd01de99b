// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote token endpoint: `GET /cgi-bin/gettoken?corpid=..&corpsecret=..`.

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Error, Result};

pub const GETTOKEN_PATH: &str = "/cgi-bin/gettoken";

/// Body of a `gettoken` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default)]
    pub access_token: String,
    /// Lifetime in seconds as reported by the remote side.
    #[serde(default)]
    pub expires_in: i64,
}

/// Perform a single token fetch.
///
/// Returns the decoded response only when `errcode == 0`; the caller checks
/// for an empty token.
pub async fn fetch_token(
    http: &reqwest::Client,
    base_url: &str,
    corp_id: &str,
    secret: &str,
) -> Result<TokenResponse> {
    let mut url = reqwest::Url::parse(&format!("{base_url}{GETTOKEN_PATH}"))
        .map_err(|e| Error::config(format!("invalid token url: {e}")))?;
    url.query_pairs_mut().append_pair("corpid", corp_id).append_pair("corpsecret", secret);

    // `without_url` keeps the secret out of error messages.
    let resp = http
        .get(url)
        .send()
        .await
        .map_err(|e| Error::transport("fetch access token", e.without_url()))?;
    let body =
        resp.bytes().await.map_err(|e| Error::transport("read token response", e.without_url()))?;
    let token: TokenResponse =
        serde_json::from_slice(&body).map_err(|e| Error::decode("decode token response", e))?;

    if token.errcode != 0 {
        return Err(ApiError::new(token.errcode, token.errmsg).into());
    }
    Ok(token)
}
