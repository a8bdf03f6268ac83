//! Transport trait for generation backends.

use async_trait::async_trait;

use deckforge_utils::error::ProviderError;
use deckforge_utils::types::GenerationRequest;

/// One backend integration style (native API, generic chat-completion HTTP,
/// session-backed gateway). Implementations are pure transport: they turn a
/// normalized request into raw response text and classify failures, leaving
/// retries, caching, and schema decoding to [`crate::Provider`].
#[async_trait]
pub trait ChatBackend: Send + Sync + std::fmt::Debug {
    /// Provider id, used in error values and log fields.
    fn name(&self) -> &str;

    /// Issue one remote call.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] classifying the failure; an HTTP-success
    /// response with no usable text is `ProviderError::EmptyResponse` so the
    /// retry layer treats it as transient.
    async fn invoke(&self, request: &GenerationRequest) -> Result<String, ProviderError>;
}
