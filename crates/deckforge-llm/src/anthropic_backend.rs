//! Native Anthropic Messages API backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use deckforge_config::ProviderConfig;
use deckforge_utils::error::ProviderError;
use deckforge_utils::types::{GenerationRequest, Role};

use crate::http_client::HttpClient;
use crate::key_pool::KeyPool;
use crate::types::ChatBackend;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// The Messages API requires `max_tokens`; used when the request carries none.
const FALLBACK_MAX_TOKENS: u32 = 2048;

#[derive(Debug)]
pub(crate) struct AnthropicBackend {
    name: String,
    client: HttpClient,
    base_url: String,
    keys: KeyPool,
    timeout: Duration,
}

impl AnthropicBackend {
    pub fn new_from_config(id: &str, config: &ProviderConfig) -> Result<Self, ProviderError> {
        let envs = config.credential_envs();
        let envs = if envs.is_empty() {
            vec!["ANTHROPIC_API_KEY".to_string()]
        } else {
            envs
        };
        let keys = KeyPool::from_envs(&envs)?;

        Ok(Self {
            name: id.to_string(),
            client: HttpClient::new()?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            keys,
            timeout: Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        // System messages ride in a dedicated top-level field.
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                json!({
                    "role": match m.role {
                        Role::User => "user",
                        _ => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": request.model_id,
            "max_tokens": request.max_tokens.unwrap_or(FALLBACK_MAX_TOKENS),
            "messages": messages,
            "temperature": request.temperature,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = json!(top_p);
        }

        debug!(
            provider = %self.name,
            model = %request.model_id,
            timeout_secs = self.timeout.as_secs(),
            "Invoking Anthropic backend"
        );

        let api_key = self.keys.next().to_string();
        let response = self
            .client
            .post_json(
                &self.name,
                &self.base_url,
                &[
                    ("x-api-key", api_key),
                    ("anthropic-version", API_VERSION.to_string()),
                ],
                &body,
                self.timeout,
            )
            .await?;

        let parsed: MessagesResponse = response.json().await.map_err(|e| {
            ProviderError::Transport {
                provider: self.name.clone(),
                reason: format!("response decode: {e}"),
            }
        })?;

        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_deref().unwrap_or_default())
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: self.name.clone(),
            });
        }
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}
