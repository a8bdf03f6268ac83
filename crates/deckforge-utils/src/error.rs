//! Error taxonomy for deckforge.
//!
//! Provider failures are a closed set: the retry layer asks
//! [`ProviderError::is_retryable`] and treats everything it does not
//! recognize as fatal for the current call. Failures of individual calls or
//! work items are contained as values (`ProviderResult`, `Option`) and never
//! abort sibling work; only startup-time misconfiguration is run-fatal.

use thiserror::Error;

/// Top-level error type returned by deckforge library operations.
#[derive(Error, Debug)]
pub enum DeckforgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Run repository error: {0}")]
    Run(#[from] RunError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration file and startup errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Errors produced while talking to a generation backend.
///
/// The retryable subset is exactly rate-limiting, timeouts, and empty
/// responses. Authentication and request-shape problems fail the call on
/// the first occurrence.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider} rate limited the request")]
    RateLimited {
        provider: String,
        /// Server-suggested wait, if the response carried one.
        retry_after_secs: Option<u64>,
    },

    #[error("{provider} call timed out after {timeout_secs}s")]
    Timeout { provider: String, timeout_secs: u64 },

    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: String },

    #[error("{provider} rejected the credentials: {reason}")]
    Auth { provider: String, reason: String },

    #[error("{provider} rejected the request: {reason}")]
    InvalidRequest { provider: String, reason: String },

    #[error("transport failure talking to {provider}: {reason}")]
    Transport { provider: String, reason: String },

    #[error("provider misconfigured: {0}")]
    Misconfiguration(String),

    #[error("unknown provider '{0}'")]
    Unsupported(String),
}

impl ProviderError {
    /// Whether the retry policy should attempt this call again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::EmptyResponse { .. }
        )
    }

    /// Short stable tag recorded in `ProviderResult::error_kind`.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout { .. } => "timeout",
            Self::EmptyResponse { .. } => "empty_response",
            Self::Auth { .. } => "auth",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Transport { .. } => "transport",
            Self::Misconfiguration(_) => "misconfiguration",
            Self::Unsupported(_) => "unsupported",
        }
    }
}

/// Cache store errors (persistence only; lookups misses are `None`, not errors).
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache record serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("request could not be fingerprinted: {0}")]
    Fingerprint(String),
}

/// Run repository errors.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("run {id} is already {status}; terminal transitions happen at most once")]
    AlreadyTerminal { id: String, status: String },

    #[error("run {id} not found")]
    NotFound { id: String },

    #[error("run IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("run record serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_set_is_closed() {
        let retryable = [
            ProviderError::RateLimited {
                provider: "p".into(),
                retry_after_secs: None,
            },
            ProviderError::Timeout {
                provider: "p".into(),
                timeout_secs: 30,
            },
            ProviderError::EmptyResponse { provider: "p".into() },
        ];
        for err in retryable {
            assert!(err.is_retryable(), "{err} should be retryable");
        }

        let fatal = [
            ProviderError::Auth {
                provider: "p".into(),
                reason: "bad key".into(),
            },
            ProviderError::InvalidRequest {
                provider: "p".into(),
                reason: "schema".into(),
            },
            ProviderError::Transport {
                provider: "p".into(),
                reason: "dns".into(),
            },
            ProviderError::Misconfiguration("no model".into()),
            ProviderError::Unsupported("frobnicator".into()),
        ];
        for err in fatal {
            assert!(!err.is_retryable(), "{err} should not be retryable");
        }
    }

    #[test]
    fn error_kind_tags_are_stable() {
        assert_eq!(
            ProviderError::EmptyResponse { provider: "x".into() }.kind(),
            "empty_response"
        );
        assert_eq!(ProviderError::Misconfiguration("m".into()).kind(), "misconfiguration");
    }
}
