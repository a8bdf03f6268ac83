//! Configuration model for deckforge.
//!
//! Configuration is TOML with one `[providers.<id>]` table per backend.
//! Secrets are never written into the file; provider tables name the
//! environment variables that hold them (`api_key_env` / `api_key_envs`).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use deckforge_utils::error::ConfigError;
use deckforge_utils::types::QuestionSet;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub generation: GenerationConfig,
    pub cache: CacheConfig,
    pub runs: RunsConfig,
    pub archive: ArchiveConfig,
    pub templates: TemplatesConfig,
    /// Keyed by provider id; the id doubles as the registry lookup name
    /// unless `kind` overrides it.
    pub providers: BTreeMap<String, ProviderConfig>,
}

/// Pipeline-wide generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Provider ids used for the fan-out generate calls.
    pub generators: Vec<String>,
    /// Provider id used for the combine step.
    pub combiner: Option<String>,
    /// Global cap on concurrently executing work-item pipelines.
    pub concurrency: usize,
    /// Maximum invocations per call for retryable failures.
    pub max_retries: u32,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Parse attempts for the combine step's schema decode loop.
    pub parse_attempts: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            generators: Vec::new(),
            combiner: None,
            concurrency: 4,
            max_retries: 3,
            min_backoff_ms: 500,
            max_backoff_ms: 8_000,
            parse_attempts: 3,
        }
    }
}

/// Cache policy flags. `enabled = false` suppresses reads and writes
/// entirely and takes precedence over `bypass_lookup`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Skip the read on the way in but still write successful responses.
    pub bypass_lookup: bool,
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bypass_lookup: false,
            dir: ".deckforge/cache".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunsConfig {
    pub dir: String,
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            dir: ".deckforge/runs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub dir: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: ".deckforge/artifacts".to_string(),
        }
    }
}

/// Inline template overrides. Templates accept `{question}`, `{schema}`,
/// and (combine only) `{inputs}` placeholders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    pub generate: Option<String>,
    pub combine: Option<String>,
}

/// One backend's settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Backend kind: `anthropic`, `openai`, or `session`. Defaults to the
    /// table key when omitted.
    pub kind: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Single credential environment variable.
    pub api_key_env: Option<String>,
    /// Credential pool for round-robin rotation; wins over `api_key_env`.
    pub api_key_envs: Option<Vec<String>>,
    /// Session backend only: cookie value environment variable.
    pub session_cookie_env: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    /// Effective backend kind for the registry lookup.
    #[must_use]
    pub fn kind_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.kind.as_deref().unwrap_or(fallback)
    }

    /// Environment variable names holding this provider's credentials.
    #[must_use]
    pub fn credential_envs(&self) -> Vec<String> {
        if let Some(envs) = &self.api_key_envs {
            envs.clone()
        } else if let Some(env) = &self.api_key_env {
            vec![env.clone()]
        } else {
            Vec::new()
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` for a missing file and
    /// `ConfigError::InvalidFile` for parse failures or invalid values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|_| ConfigError::NotFound {
            path: path.display().to_string(),
        })?;
        let config: Self =
            toml::from_str(&text).map_err(|e| ConfigError::InvalidFile(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Basic sanity checks beyond serde's shape validation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                key: "generation.concurrency".to_string(),
                value: "0".to_string(),
            });
        }
        if self.generation.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "generation.max_retries".to_string(),
                value: "0".to_string(),
            });
        }
        for id in &self.generation.generators {
            if !self.providers.contains_key(id) {
                return Err(ConfigError::MissingRequired(format!(
                    "[providers.{id}] (referenced by generation.generators)"
                )));
            }
        }
        if let Some(combiner) = &self.generation.combiner {
            if !self.providers.contains_key(combiner) {
                return Err(ConfigError::MissingRequired(format!(
                    "[providers.{combiner}] (referenced by generation.combiner)"
                )));
            }
        }
        Ok(())
    }

    /// Minimal valid configuration for unit tests. No providers configured;
    /// tests add what they need.
    #[must_use]
    pub fn minimal_for_testing() -> Self {
        Self::default()
    }
}

/// Load a categorized question set from a JSON or TOML file (thin wrapper;
/// the interesting enumeration logic lives on [`QuestionSet`]).
pub fn load_question_set(path: &Path) -> Result<QuestionSet, ConfigError> {
    let text = fs::read_to_string(path).map_err(|_| ConfigError::NotFound {
        path: path.display().to_string(),
    })?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&text).map_err(|e| ConfigError::InvalidFile(e.to_string()))
    } else {
        serde_json::from_str(&text).map_err(|e| ConfigError::InvalidFile(e.to_string()))
    }
}
