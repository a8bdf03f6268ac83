//! Run orchestration: fan-out generation, combination, artifacts, provenance.

mod archive;
mod orchestrator;
mod run_repo;
mod shuffle;
mod templates;

use std::path::Path;
use std::sync::Arc;

use tracing::error;

use deckforge_cache::CacheStore;
use deckforge_config::Config;
use deckforge_llm::build_provider_set;
use deckforge_runner::TaskRunner;
use deckforge_utils::error::{DeckforgeError, ProviderError};
use deckforge_utils::types::QuestionSet;

pub use archive::ArtifactArchive;
pub use orchestrator::{Orchestrator, RunOutcome};
pub use run_repo::RunRepository;
pub use shuffle::shuffle_mcq_answers;
pub use templates::{
    schema_for_card_type, BASIC_CARD_SCHEMA, DEFAULT_COMBINE_TEMPLATE, DEFAULT_GENERATE_TEMPLATE,
    MCQ_CARD_SCHEMA,
};

/// Open the cache store named by config, or `None` when caching is
/// disabled. Disabled takes precedence over the bypass flag.
pub fn open_cache(config: &Config) -> Result<Option<Arc<CacheStore>>, DeckforgeError> {
    if !config.cache.enabled {
        return Ok(None);
    }
    let store = CacheStore::open(Path::new(&config.cache.dir)).map_err(DeckforgeError::Cache)?;
    Ok(Some(Arc::new(store)))
}

/// Wire the whole pipeline from configuration and execute one run.
///
/// Provider initialization yielding zero usable providers is the one hard,
/// run-level failure: a run record is still created and marked `failed`
/// before the error propagates, so the attempt is visible in provenance.
pub async fn run_pipeline(
    config: &Config,
    question_set: &QuestionSet,
    subject: &str,
    card_type: &str,
    user_label: Option<&str>,
) -> Result<RunOutcome, DeckforgeError> {
    let cache = open_cache(config)?;
    let runs = Arc::new(RunRepository::open(&config.runs.dir)?);

    let provider_set = match build_provider_set(config, cache) {
        Ok(set) => set,
        Err(e @ ProviderError::Misconfiguration(_)) => {
            error!(error = %e, "No usable providers; marking run failed");
            let run = runs.create_run(
                user_label,
                "deck",
                subject,
                card_type,
                question_set.work_items().len(),
            )?;
            runs.mark_run_failed(&run.id)?;
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    let orchestrator = Orchestrator::new(
        provider_set.generators,
        provider_set.combiner,
        TaskRunner::new(config.generation.concurrency),
        ArtifactArchive::new(&config.archive.dir),
        runs,
        card_type,
    )
    .with_templates(
        config.templates.generate.clone(),
        config.templates.combine.clone(),
    );

    orchestrator.execute(subject, user_label, question_set).await
}
