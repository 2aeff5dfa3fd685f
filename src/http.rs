//! Shared HTTP plumbing for upstream JSON APIs

use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{Error, Result};

/// Build a client with the per-request timeout applied
pub fn client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_default()
}

/// Send a prepared request and decode the JSON body
///
/// Transport errors and non-2xx statuses become `SourceUnavailable`,
/// 429 becomes `RateLimited`, undecodable bodies become `MalformedResponse`.
pub async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    provider: &str,
) -> Result<T> {
    let resp = request.send().await.map_err(|e| {
        if e.is_timeout() {
            Error::unavailable(provider, "request timed out")
        } else {
            Error::unavailable(provider, e)
        }
    })?;

    let status = resp.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(Error::RateLimited(provider.to_string()));
    }
    if !status.is_success() {
        return Err(Error::unavailable(provider, format!("HTTP {}", status)));
    }

    resp.json().await.map_err(|e| Error::MalformedResponse {
        provider: provider.to_string(),
        reason: e.to_string(),
    })
}
