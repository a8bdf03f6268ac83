//! deckforge: resilient multi-provider flashcard generation.
//!
//! Queries several redundant AI backends per topic, deduplicates identical
//! requests through a content-addressed cache, retries transient failures,
//! and merges the independent drafts into one structured card set while
//! tracking run provenance.
//!
//! This crate is the facade; the work lives in the member crates:
//! `deckforge-utils` (shared types, errors), `deckforge-config`,
//! `deckforge-cache` (fingerprint store), `deckforge-llm` (backends, retry),
//! `deckforge-runner` (bounded concurrency), and `deckforge-engine`
//! (orchestration, artifacts, runs).

pub use deckforge_cache::{fingerprint, CacheStats, CacheStore};
pub use deckforge_config::{load_question_set, Config, ProviderConfig};
pub use deckforge_engine::{
    open_cache, run_pipeline, ArtifactArchive, Orchestrator, RunOutcome, RunRepository,
};
pub use deckforge_llm::{build_provider_set, ChatBackend, Provider, ProviderSet, RetryPolicy};
pub use deckforge_runner::TaskRunner;
pub use deckforge_utils::error::{DeckforgeError, ProviderError};
pub use deckforge_utils::types::{
    Card, CombinedArtifact, GenerationRequest, Message, QuestionSet, Role, Run, RunStatus,
};
