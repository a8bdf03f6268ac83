//! Generic OpenAI-compatible chat-completions backend.
//!
//! Covers the OpenAI API itself plus compatible gateways (OpenRouter and
//! friends) via `base_url`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use deckforge_config::ProviderConfig;
use deckforge_utils::error::ProviderError;
use deckforge_utils::types::{GenerationRequest, Message, Role};

use crate::http_client::HttpClient;
use crate::key_pool::KeyPool;
use crate::types::ChatBackend;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug)]
pub(crate) struct OpenAiBackend {
    name: String,
    client: HttpClient,
    base_url: String,
    keys: KeyPool,
    timeout: Duration,
}

impl OpenAiBackend {
    pub fn new_from_config(id: &str, config: &ProviderConfig) -> Result<Self, ProviderError> {
        let envs = config.credential_envs();
        let envs = if envs.is_empty() {
            vec!["OPENAI_API_KEY".to_string()]
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

    fn convert_messages(messages: &[Message]) -> Vec<WireMessage> {
        messages
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: m.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        let mut body = json!({
            "model": request.model_id,
            "messages": Self::convert_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(top_p) = request.top_p {
            body["top_p"] = json!(top_p);
        }
        if request.json_schema.is_some() {
            body["response_format"] = json!({"type": "json_object"});
        }

        debug!(
            provider = %self.name,
            model = %request.model_id,
            timeout_secs = self.timeout.as_secs(),
            "Invoking chat-completions backend"
        );

        let api_key = self.keys.next().to_string();
        let response = self
            .client
            .post_json(
                &self.name,
                &self.base_url,
                &[("Authorization", format!("Bearer {api_key}"))],
                &body,
                self.timeout,
            )
            .await?;

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            ProviderError::Transport {
                provider: self.name.clone(),
                reason: format!("response decode: {e}"),
            }
        })?;

        let content = parsed
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: self.name.clone(),
            });
        }
        Ok(content)
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
