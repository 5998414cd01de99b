// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared HTTP transport construction.

use std::sync::Once;
use std::time::Duration;

use crate::error::{Error, Result};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; a provider installed by the host wins.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Build the client used for both token fetches and API calls.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    ensure_crypto();
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::transport("build http client", e))
}
