//! End-to-end protocol per work item: fan out, combine, persist.

use std::sync::Arc;

use futures::future::join_all;
use rand::thread_rng;
use tracing::{debug, info, warn};

use deckforge_llm::Provider;
use deckforge_runner::TaskRunner;
use deckforge_utils::error::DeckforgeError;
use deckforge_utils::types::{CombinedArtifact, QuestionSet, Run, RunStats, WorkItem};

use crate::archive::ArtifactArchive;
use crate::run_repo::RunRepository;
use crate::shuffle::shuffle_mcq_answers;
use crate::templates::{schema_for_card_type, DEFAULT_COMBINE_TEMPLATE, DEFAULT_GENERATE_TEMPLATE};

/// Final result of one run: the provenance record and every artifact that
/// survived its item pipeline.
pub struct RunOutcome {
    pub run: Run,
    pub artifacts: Vec<CombinedArtifact>,
}

/// Drives the per-item protocol across a whole question set.
///
/// Owns the run lifecycle exclusively; item failures are contained and
/// surface only as counters on the finished run.
pub struct Orchestrator {
    inner: Arc<ItemPipeline>,
    runner: TaskRunner,
    runs: Arc<RunRepository>,
    card_type: String,
}

/// Everything one item pipeline needs, shared across concurrent items.
struct ItemPipeline {
    generators: Vec<Arc<Provider>>,
    combiner: Arc<Provider>,
    archive: ArtifactArchive,
    generate_template: String,
    combine_template: String,
    schema: String,
    shuffle_mcq: bool,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        generators: Vec<Arc<Provider>>,
        combiner: Arc<Provider>,
        runner: TaskRunner,
        archive: ArtifactArchive,
        runs: Arc<RunRepository>,
        card_type: impl Into<String>,
    ) -> Self {
        let card_type = card_type.into();
        Self {
            inner: Arc::new(ItemPipeline {
                generators,
                combiner,
                archive,
                generate_template: DEFAULT_GENERATE_TEMPLATE.to_string(),
                combine_template: DEFAULT_COMBINE_TEMPLATE.to_string(),
                schema: schema_for_card_type(&card_type).to_string(),
                shuffle_mcq: card_type == "mcq",
            }),
            runner,
            runs,
            card_type,
        }
    }

    /// Override the built-in templates, e.g. from `[templates]` config.
    #[must_use]
    pub fn with_templates(mut self, generate: Option<String>, combine: Option<String>) -> Self {
        let inner = Arc::get_mut(&mut self.inner)
            .unwrap_or_else(|| unreachable!("templates are set before the pipeline is shared"));
        if let Some(generate) = generate {
            inner.generate_template = generate;
        }
        if let Some(combine) = combine {
            inner.combine_template = combine;
        }
        self
    }

    /// Run the whole question set to completion.
    ///
    /// Always terminates the run as `completed`, with per-item failures
    /// reflected in the counters; only repository IO can error out.
    pub async fn execute(
        &self,
        subject: &str,
        user_label: Option<&str>,
        question_set: &QuestionSet,
    ) -> Result<RunOutcome, DeckforgeError> {
        let items = question_set.work_items();
        let total = items.len();
        let run = self
            .runs
            .create_run(user_label, "deck", subject, &self.card_type, total)?;
        info!(
            run = %run.id,
            subject,
            items = total,
            generators = self.inner.generators.len(),
            combiner = self.inner.combiner.name(),
            "Starting run"
        );

        let tasks: Vec<_> = items
            .into_iter()
            .map(|item| {
                let pipeline = Arc::clone(&self.inner);
                move || async move { pipeline.process(item).await }
            })
            .collect();
        let artifacts = self.runner.run_all(tasks).await;

        let stats = RunStats {
            total,
            successful: artifacts.len(),
            failed: total - artifacts.len(),
        };
        let run = self.runs.mark_run_completed(&run.id, stats)?;
        info!(
            run = %run.id,
            successful = stats.successful,
            failed = stats.failed,
            "Run finished"
        );
        Ok(RunOutcome { run, artifacts })
    }
}

impl ItemPipeline {
    /// One work item end to end. Returns `None` on any contained failure.
    async fn process(&self, item: WorkItem) -> Option<CombinedArtifact> {
        let labeled = self.fan_out(&item).await;
        if labeled.is_empty() {
            warn!(
                topic = %item.topic_text,
                "Every generator came back empty; skipping combine"
            );
            return None;
        }

        let combined_inputs = format_combiner_input(&labeled);
        let mut artifact = match self
            .combiner
            .combine(
                &item.topic_text,
                &combined_inputs,
                &self.schema,
                &self.combine_template,
            )
            .await
        {
            Some(artifact) => artifact,
            None => {
                warn!(topic = %item.topic_text, "Combine exhausted its attempts");
                return None;
            }
        };

        if artifact.topic.is_empty() {
            artifact.topic = item.topic_text.clone();
        }
        if self.shuffle_mcq {
            shuffle_mcq_answers(&mut artifact, &mut thread_rng());
        }

        // Archival failure is logged but does not fail the item; the
        // artifact still reaches the caller's aggregate list.
        if let Err(e) = self.archive.save(&artifact, &item.topic_text) {
            warn!(topic = %item.topic_text, error = %e, "Failed to archive artifact");
        }

        debug!(
            topic = %item.topic_text,
            cards = artifact.cards.len(),
            drafts = labeled.len(),
            "Item complete"
        );
        Some(artifact)
    }

    /// Call every generator concurrently; keep the non-empty outputs with
    /// their source names.
    async fn fan_out(&self, item: &WorkItem) -> Vec<(String, String)> {
        let results = join_all(self.generators.iter().map(|provider| async move {
            let result = provider
                .generate(&item.topic_text, &self.schema, &self.generate_template)
                .await;
            (provider.name().to_string(), result)
        }))
        .await;

        results
            .into_iter()
            .filter(|(_, result)| !result.is_empty())
            .map(|(name, result)| (name, result.raw_text))
            .collect()
    }
}

/// Join the drafts into one combiner input, labeled by source provider.
fn format_combiner_input(labeled: &[(String, String)]) -> String {
    let mut input = String::new();
    for (name, text) in labeled {
        input.push_str(&format!("=== {name} ===\n{text}\n\n"));
    }
    input
}
