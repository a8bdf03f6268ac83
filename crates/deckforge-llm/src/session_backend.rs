//! Browser-session-backed gateway backend.
//!
//! Talks to a local gateway that proxies an authenticated browser session;
//! credentials are session cookie values rather than API keys, rotated the
//! same way. Gateways are slow, so the default timeout is generous.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use deckforge_config::ProviderConfig;
use deckforge_utils::error::ProviderError;
use deckforge_utils::types::GenerationRequest;

use crate::http_client::HttpClient;
use crate::key_pool::KeyPool;
use crate::types::ChatBackend;

const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug)]
pub(crate) struct SessionBackend {
    name: String,
    client: HttpClient,
    base_url: String,
    cookies: KeyPool,
    timeout: Duration,
}

impl SessionBackend {
    pub fn new_from_config(id: &str, config: &ProviderConfig) -> Result<Self, ProviderError> {
        let base_url = config.base_url.clone().ok_or_else(|| {
            ProviderError::Misconfiguration(format!(
                "[providers.{id}] base_url is required for session backends"
            ))
        })?;

        let cookie_env = config.session_cookie_env.clone().ok_or_else(|| {
            ProviderError::Misconfiguration(format!(
                "[providers.{id}] session_cookie_env is required for session backends"
            ))
        })?;
        let cookies = KeyPool::from_envs(&[cookie_env])?;

        Ok(Self {
            name: id.to_string(),
            client: HttpClient::new()?,
            base_url,
            cookies,
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }
}

#[async_trait]
impl ChatBackend for SessionBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let body = json!({
            "model": request.model_id,
            "messages": request.messages,
            "temperature": request.temperature,
        });

        debug!(
            provider = %self.name,
            model = %request.model_id,
            timeout_secs = self.timeout.as_secs(),
            "Invoking session gateway backend"
        );

        let cookie = self.cookies.next().to_string();
        let response = self
            .client
            .post_json(
                &self.name,
                &self.base_url,
                &[("Cookie", format!("session={cookie}"))],
                &body,
                self.timeout,
            )
            .await?;

        let parsed: GatewayResponse = response.json().await.map_err(|e| {
            ProviderError::Transport {
                provider: self.name.clone(),
                reason: format!("response decode: {e}"),
            }
        })?;

        let text = parsed.text.unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: self.name.clone(),
            });
        }
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    text: Option<String>,
}
