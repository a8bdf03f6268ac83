//! Round-robin credential rotation.

use std::sync::atomic::{AtomicUsize, Ordering};

use deckforge_utils::error::ProviderError;

/// Credential pool owned by one backend instance.
///
/// The cursor is a relaxed atomic: rotation only needs every key to be used
/// eventually, not a strict global order across tasks.
#[derive(Debug)]
pub struct KeyPool {
    keys: Vec<String>,
    cursor: AtomicUsize,
}

impl KeyPool {
    /// Build from explicit key values. Empty pools are a misconfiguration.
    pub fn new(keys: Vec<String>) -> Result<Self, ProviderError> {
        if keys.is_empty() {
            return Err(ProviderError::Misconfiguration(
                "credential pool is empty".to_string(),
            ));
        }
        Ok(Self {
            keys,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Resolve each named environment variable. Unset variables are skipped;
    /// all unset is a misconfiguration naming the variables looked at.
    pub fn from_envs(env_names: &[String]) -> Result<Self, ProviderError> {
        let keys: Vec<String> = env_names
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .filter(|v| !v.is_empty())
            .collect();

        if keys.is_empty() {
            return Err(ProviderError::Misconfiguration(format!(
                "no credentials found in environment variables [{}]",
                env_names.join(", ")
            )));
        }
        Self::new(keys)
    }

    /// Next key in round-robin order.
    #[must_use]
    pub fn next(&self) -> &str {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.keys.len();
        &self.keys[index]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
