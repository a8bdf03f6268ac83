//! Shared HTTP plumbing for the backend implementations.
//!
//! Maps transport outcomes onto the provider error taxonomy in one place so
//! every backend classifies failures identically.

use std::time::Duration;

use deckforge_utils::error::ProviderError;

/// Thin wrapper over a `reqwest::Client` with per-request timeouts.
#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::Misconfiguration(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// POST a JSON body and classify the outcome.
    ///
    /// Non-success statuses never reach the caller as `Ok`; they are mapped
    /// to the taxonomy here (429 → rate-limited, 401/403 → auth,
    /// 400/404/422 → invalid request, anything else → transport).
    pub async fn post_json(
        &self,
        provider: &str,
        url: &str,
        headers: &[(&str, String)],
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut request = self.client.post(url).timeout(timeout).json(body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    provider: provider.to_string(),
                    timeout_secs: timeout.as_secs(),
                }
            } else {
                ProviderError::Transport {
                    provider: provider.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status.as_u16() {
            429 => {
                let retry_after_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                Err(ProviderError::RateLimited {
                    provider: provider.to_string(),
                    retry_after_secs,
                })
            }
            401 | 403 => Err(ProviderError::Auth {
                provider: provider.to_string(),
                reason: format!("HTTP {status}"),
            }),
            400 | 404 | 422 => Err(ProviderError::InvalidRequest {
                provider: provider.to_string(),
                reason: body_tail(response).await,
            }),
            _ => Err(ProviderError::Transport {
                provider: provider.to_string(),
                reason: format!("HTTP {status}"),
            }),
        }
    }
}

/// First few hundred bytes of an error body, for diagnostics.
async fn body_tail(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(text) => {
            let snippet: String = text.chars().take(300).collect();
            format!("HTTP {status}: {snippet}")
        }
        Err(_) => format!("HTTP {status}"),
    }
}
