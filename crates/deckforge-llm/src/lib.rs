//! Provider backends and the resilience layer around them.
//!
//! The split mirrors the call path: a [`ChatBackend`] is pure transport for
//! one wire protocol, and a [`Provider`] wraps a backend with retry, cache
//! policy, and schema decoding. Backends are constructed from configuration
//! through a small name registry, so adding a protocol means one module and
//! one registry arm.

mod anthropic_backend;
mod http_client;
mod key_pool;
mod openai_backend;
mod provider;
mod retry;
mod session_backend;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use deckforge_cache::CacheStore;
use deckforge_config::{Config, ProviderConfig};
use deckforge_utils::error::ProviderError;

use anthropic_backend::AnthropicBackend;
use openai_backend::OpenAiBackend;
use session_backend::SessionBackend;

pub use provider::{render_template, Provider};
pub use retry::RetryPolicy;
pub use types::ChatBackend;

/// Backend kinds the registry can construct.
pub const SUPPORTED_KINDS: &[&str] = &["anthropic", "openai", "session"];

/// The configured provider fleet: fan-out generators plus the combiner.
#[derive(Debug)]
pub struct ProviderSet {
    pub generators: Vec<Arc<Provider>>,
    pub combiner: Arc<Provider>,
}

/// Construct the transport backend named by `kind`.
fn construct_backend(
    kind: &str,
    id: &str,
    config: &ProviderConfig,
) -> Result<Arc<dyn ChatBackend>, ProviderError> {
    match kind {
        "anthropic" => Ok(Arc::new(AnthropicBackend::new_from_config(id, config)?)),
        "openai" => Ok(Arc::new(OpenAiBackend::new_from_config(id, config)?)),
        "session" => Ok(Arc::new(SessionBackend::new_from_config(id, config)?)),
        other => Err(ProviderError::Unsupported(format!(
            "unknown backend kind '{other}' for [providers.{id}]; supported kinds: {}",
            SUPPORTED_KINDS.join(", ")
        ))),
    }
}

/// Build one provider from its config table.
///
/// # Errors
///
/// Fails with `Misconfiguration` when the model is missing or credentials
/// are absent, and `Unsupported` for unknown backend kinds.
pub fn provider_from_config(
    id: &str,
    provider_config: &ProviderConfig,
    config: &Config,
    cache: Option<Arc<CacheStore>>,
) -> Result<Provider, ProviderError> {
    let kind = provider_config.kind_or(id);
    let backend = construct_backend(kind, id, provider_config)?;
    let model = provider_config.model.clone().ok_or_else(|| {
        ProviderError::Misconfiguration(format!("[providers.{id}] model is required"))
    })?;

    let retry = RetryPolicy::new(
        config.generation.max_retries,
        Duration::from_millis(config.generation.min_backoff_ms),
        Duration::from_millis(config.generation.max_backoff_ms),
    );

    let mut provider = Provider::new(id, backend, model, retry, config.generation.parse_attempts)
        .with_sampling(
            provider_config.temperature,
            provider_config.max_tokens,
            provider_config.top_p,
        );
    if let Some(cache) = cache {
        provider = provider.with_cache(cache, config.cache.bypass_lookup);
    }
    Ok(provider)
}

/// Build the full fleet from configuration.
///
/// A generator that fails to construct is logged and skipped so one bad
/// provider table does not take the whole run down; zero usable generators
/// is fatal. A failing configured combiner falls back to the first
/// generator, again with a warning.
pub fn build_provider_set(
    config: &Config,
    cache: Option<Arc<CacheStore>>,
) -> Result<ProviderSet, ProviderError> {
    let mut generators = Vec::new();
    for id in &config.generation.generators {
        let Some(provider_config) = config.providers.get(id) else {
            warn!(provider = %id, "Skipping generator with no [providers.{id}] table");
            continue;
        };
        match provider_from_config(id, provider_config, config, cache.clone()) {
            Ok(provider) => generators.push(Arc::new(provider)),
            Err(e) => warn!(provider = %id, error = %e, "Skipping unusable generator"),
        }
    }
    if generators.is_empty() {
        return Err(ProviderError::Misconfiguration(
            "no usable generator providers; check generation.generators and credentials"
                .to_string(),
        ));
    }

    let combiner = match &config.generation.combiner {
        Some(id) => {
            if let Some(existing) = generators.iter().find(|p| p.name() == id) {
                Arc::clone(existing)
            } else {
                let constructed = config.providers.get(id).ok_or_else(|| {
                    ProviderError::Misconfiguration(format!(
                        "[providers.{id}] (referenced by generation.combiner) is missing"
                    ))
                });
                match constructed
                    .and_then(|pc| provider_from_config(id, pc, config, cache.clone()))
                {
                    Ok(provider) => Arc::new(provider),
                    Err(e) => {
                        warn!(
                            combiner = %id,
                            error = %e,
                            "Configured combiner unusable; falling back to first generator"
                        );
                        Arc::clone(&generators[0])
                    }
                }
            }
        }
        None => Arc::clone(&generators[0]),
    };

    Ok(ProviderSet {
        generators,
        combiner,
    })
}

#[cfg(test)]
mod factory_tests {
    use super::*;

    #[test]
    fn unknown_kind_is_unsupported() {
        let provider_config = ProviderConfig {
            kind: Some("cohere".to_string()),
            ..ProviderConfig::default()
        };
        let err = construct_backend("cohere", "co", &provider_config).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("cohere"));
        assert!(message.contains("anthropic"));
    }

    #[test]
    fn kind_defaults_to_provider_id() {
        std::env::remove_var("DECKFORGE_FACTORY_TEST_MISSING");
        let mut config = Config::minimal_for_testing();
        config.generation.generators = vec!["anthropic".to_string()];
        config.providers.insert(
            "anthropic".to_string(),
            ProviderConfig {
                model: Some("claude-sonnet".to_string()),
                api_key_env: Some("DECKFORGE_FACTORY_TEST_MISSING".to_string()),
                ..ProviderConfig::default()
            },
        );

        // Resolves to the anthropic registry arm, then fails on credentials.
        let provider_config = &config.providers["anthropic"];
        let err =
            provider_from_config("anthropic", provider_config, &config, None).unwrap_err();
        assert!(matches!(err, ProviderError::Misconfiguration(_)));
    }

    #[test]
    fn zero_usable_generators_is_fatal() {
        let config = Config::minimal_for_testing();
        let err = build_provider_set(&config, None).unwrap_err();
        assert!(matches!(err, ProviderError::Misconfiguration(_)));
    }

    #[test]
    fn missing_model_is_misconfiguration() {
        std::env::set_var("DECKFORGE_FACTORY_TEST_KEY", "k");
        let config = Config::minimal_for_testing();
        let provider_config = ProviderConfig {
            kind: Some("openai".to_string()),
            api_key_env: Some("DECKFORGE_FACTORY_TEST_KEY".to_string()),
            ..ProviderConfig::default()
        };
        let err = provider_from_config("gpt", &provider_config, &config, None).unwrap_err();
        assert!(err.to_string().contains("model"));
        std::env::remove_var("DECKFORGE_FACTORY_TEST_KEY");
    }
}
