//! End-to-end pipeline tests over scripted backends.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use deckforge::{
    ArtifactArchive, CacheStore, ChatBackend, Orchestrator, Provider, ProviderError,
    GenerationRequest, QuestionSet, RetryPolicy, RunRepository, RunStatus, TaskRunner,
};
use deckforge_utils::types::Category;

/// Backend that always returns the same text and counts invocations.
#[derive(Debug)]
struct ScriptedBackend {
    reply: String,
    calls: AtomicU32,
}

impl ScriptedBackend {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, _request: &GenerationRequest) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

fn retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2))
}

fn question_set(topics: &[&str]) -> QuestionSet {
    QuestionSet {
        categories: vec![Category {
            name: "History".into(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
        }],
    }
}

const MCQ_ARTIFACT: &str = r#"{
    "title": "Hanseatic League",
    "topic": "The Hanseatic League",
    "difficulty": "medium",
    "cards": [
        {
            "card_type": "mcq",
            "tags": ["history"],
            "front": "Which city led the League?",
            "back": "Luebeck",
            "options": ["Luebeck", "Hamburg", "Bremen", "Cologne"],
            "correct_answer": "A"
        }
    ]
}"#;

#[tokio::test]
async fn full_mcq_run_shuffles_and_archives() {
    let archive_dir = tempfile::tempdir().unwrap();
    let generator_backend = ScriptedBackend::new("a thorough draft about the League");
    let combiner_backend = ScriptedBackend::new(MCQ_ARTIFACT);

    let generator = Arc::new(Provider::new(
        "alpha",
        generator_backend.clone() as Arc<dyn ChatBackend>,
        "model-a",
        retry(),
        3,
    ));
    let combiner = Arc::new(Provider::new(
        "merge",
        combiner_backend.clone() as Arc<dyn ChatBackend>,
        "model-m",
        retry(),
        3,
    ));

    let orchestrator = Orchestrator::new(
        vec![generator],
        combiner,
        TaskRunner::new(4),
        ArtifactArchive::new(archive_dir.path()),
        Arc::new(RunRepository::in_memory()),
        "mcq",
    );

    let outcome = orchestrator
        .execute("history", Some("integration"), &question_set(&["The Hanseatic League"]))
        .await
        .unwrap();

    assert_eq!(outcome.run.status, RunStatus::Completed);
    assert_eq!(outcome.run.successful, 1);

    let card = &outcome.artifacts[0].cards[0];
    let options = card.options.as_ref().unwrap();
    assert_eq!(options.len(), 4);

    // Whatever permutation was chosen, the correct letter must still point
    // at the right content.
    let letter = card.correct_answer.as_deref().unwrap();
    let index = (letter.as_bytes()[0] - b'A') as usize;
    assert_eq!(options[index], "Luebeck");

    // One archived artifact on disk.
    assert_eq!(std::fs::read_dir(archive_dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn cache_deduplicates_across_consecutive_runs() {
    let archive_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(CacheStore::in_memory());

    let generator_backend = ScriptedBackend::new("the only draft");
    let combiner_backend = ScriptedBackend::new(r#"{"title":"t","cards":[]}"#);

    let build = |id: &str, backend: Arc<ScriptedBackend>| {
        Arc::new(
            Provider::new(id, backend as Arc<dyn ChatBackend>, "m", retry(), 3)
                .with_cache(Arc::clone(&cache), false),
        )
    };

    let orchestrator = Orchestrator::new(
        vec![build("alpha", generator_backend.clone())],
        build("merge", combiner_backend.clone()),
        TaskRunner::new(2),
        ArtifactArchive::new(archive_dir.path()),
        Arc::new(RunRepository::in_memory()),
        "basic",
    );

    let set = question_set(&["groups"]);
    orchestrator.execute("math", None, &set).await.unwrap();
    orchestrator.execute("math", None, &set).await.unwrap();

    // Identical requests in the second run were served from the cache.
    assert_eq!(generator_backend.calls(), 1);
    assert_eq!(combiner_backend.calls(), 1);
    assert!(cache.stats().total_hits >= 2);
}

#[tokio::test]
async fn many_items_complete_under_small_concurrency_cap() {
    let archive_dir = tempfile::tempdir().unwrap();
    let generator_backend = ScriptedBackend::new("draft");
    let combiner_backend = ScriptedBackend::new(r#"{"title":"t","cards":[]}"#);

    let topics: Vec<String> = (0..10).map(|n| format!("topic {n}")).collect();
    let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();

    let orchestrator = Orchestrator::new(
        vec![Arc::new(Provider::new(
            "alpha",
            generator_backend.clone() as Arc<dyn ChatBackend>,
            "m",
            retry(),
            3,
        ))],
        Arc::new(Provider::new(
            "merge",
            combiner_backend.clone() as Arc<dyn ChatBackend>,
            "m",
            retry(),
            3,
        )),
        TaskRunner::new(2),
        ArtifactArchive::new(archive_dir.path()),
        Arc::new(RunRepository::in_memory()),
        "basic",
    );

    let outcome = orchestrator
        .execute("mixed", None, &question_set(&topic_refs))
        .await
        .unwrap();

    assert_eq!(outcome.run.total, 10);
    assert_eq!(outcome.run.successful, 10);
    assert_eq!(outcome.artifacts.len(), 10);
}
