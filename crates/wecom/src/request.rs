// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request descriptors and the uniform response envelope.

use std::fmt;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, Error, Result};

/// Query parameter the pipeline injects the access token under.
pub const TOKEN_PARAM: &str = "access_token";

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            other => Err(Error::config(format!("unsupported method {other:?}"))),
        }
    }
}

/// Description of one API call, before the token is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<serde_json::Value>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: vec![], body: None }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Append a query parameter. Repeated keys are kept.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize `payload` as the JSON body.
    pub fn json<T: Serialize + ?Sized>(self, payload: &T) -> Result<Self> {
        let value =
            serde_json::to_value(payload).map_err(|e| Error::decode("encode request body", e))?;
        Ok(self.body(value))
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    /// Full URL for this request with `token` appended as the last query
    /// parameter.
    pub fn url(&self, base_url: &str, token: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&format!("{base_url}{}", self.path))
            .map_err(|e| Error::config(format!("invalid request url for {}: {e}", self.path)))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query {
                pairs.append_pair(k, v);
            }
            pairs.append_pair(TOKEN_PARAM, token);
        }
        Ok(url)
    }

    /// Build the transport request. POST bodies are sent as JSON.
    pub fn build(
        &self,
        http: &reqwest::Client,
        base_url: &str,
        token: &str,
    ) -> Result<reqwest::Request> {
        let url = self.url(base_url, token)?;
        let mut builder = http.request(self.method.to_reqwest(), url);
        if let (Method::Post, Some(body)) = (self.method, &self.body) {
            let bytes = serde_json::to_vec(body).map_err(|e| Error::decode("encode request body", e))?;
            builder = builder.header(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE)).body(bytes);
        }
        builder.build().map_err(|e| Error::transport("build request", e.without_url()))
    }
}

/// The `errcode`/`errmsg` pair every response carries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Envelope {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// A decoded response envelope plus the raw body and transport metadata.
#[derive(Debug, Clone)]
pub struct Response {
    pub errcode: i64,
    pub errmsg: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Decode the envelope fields from `body`.
    pub fn parse(status: StatusCode, headers: HeaderMap, body: Bytes) -> Result<Self> {
        let envelope: Envelope =
            serde_json::from_slice(&body).map_err(|e| Error::decode("decode response envelope", e))?;
        Ok(Self { errcode: envelope.errcode, errmsg: envelope.errmsg, status, headers, body })
    }

    pub fn is_success(&self) -> bool {
        self.errcode == 0
    }

    /// The structured error for a non-zero `errcode`.
    pub fn api_error(&self) -> Option<ApiError> {
        (!self.is_success()).then(|| ApiError::new(self.errcode, self.errmsg.clone()))
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Replace the raw body (for after-parse interceptors).
    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    /// Decode the body into a caller-chosen type.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::decode("decode response body", e))
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
