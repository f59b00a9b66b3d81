//! Shared HTTP plumbing for remote providers.
//!
//! Providers make exactly one request per call; retrying is the pipelines'
//! job. Errors are classified here so the retry loop can tell them apart:
//!
//! - HTTP 429 / 5xx and network errors → plain `anyhow` error (transient)
//! - other HTTP 4xx → [`ContextError::Provider`] (permanent, not retried)

use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

use context_db_core::ContextError;

pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// POST a JSON body and return the decoded JSON response.
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &Value,
) -> Result<Value> {
    let mut request = client
        .post(url)
        .header("Content-Type", "application/json")
        .json(body);
    if let Some(token) = bearer {
        request = request.header("Authorization", format!("Bearer {}", token));
    }

    let response = request
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("request to {} failed: {}", url, e))?;
    let status = response.status();

    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body_text = response.text().await.unwrap_or_default();
    if status.as_u16() == 429 || status.is_server_error() {
        anyhow::bail!("{} returned {}: {}", url, status, body_text);
    }
    Err(ContextError::Provider(format!("{} returned {}: {}", url, status, body_text)).into())
}

/// Join a base URL and a path without doubling slashes.
pub fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
