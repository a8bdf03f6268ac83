//! Run provenance store: one JSON record per run, monotonic status.
//!
//! The orchestrator exclusively owns run lifecycle, so the in-memory map
//! only serializes concurrent reads; terminal transitions happen once, at
//! the end of a run, and calling a second terminal transition is a
//! programming error surfaced as [`RunError::AlreadyTerminal`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, warn};

use deckforge_utils::atomic_write::write_file_atomic;
use deckforge_utils::error::RunError;
use deckforge_utils::types::{Run, RunStats, RunStatus};

/// Process-local discriminator so two runs created in the same second get
/// distinct ids.
static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct RunRepository {
    dir: Option<PathBuf>,
    runs: Mutex<HashMap<String, Run>>,
}

impl RunRepository {
    /// Ephemeral repository for tests.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Open a directory-backed repository, loading existing run records.
    /// Unreadable records are skipped with a warning.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, RunError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut runs = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.extension().map_or(false, |ext| ext == "json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(RunError::from)
                .and_then(|text| serde_json::from_str::<Run>(&text).map_err(RunError::from))
            {
                Ok(run) => {
                    runs.insert(run.id.clone(), run);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable run record");
                }
            }
        }

        debug!(dir = %dir.display(), runs = runs.len(), "Opened run repository");
        Ok(Self {
            dir: Some(dir),
            runs: Mutex::new(runs),
        })
    }

    /// Create a run in the `running` state and persist it.
    pub fn create_run(
        &self,
        user_label: Option<&str>,
        mode: &str,
        subject: &str,
        card_type: &str,
        total: usize,
    ) -> Result<Run, RunError> {
        let now = Utc::now();
        let seq = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
        let run = Run {
            id: format!("run-{}-{seq:04}", now.format("%Y%m%dT%H%M%S")),
            user_label: user_label.map(String::from),
            mode: mode.to_string(),
            subject: subject.to_string(),
            card_type: card_type.to_string(),
            status: RunStatus::Running,
            total,
            successful: 0,
            failed: 0,
            created_at: now,
            completed_at: None,
        };

        self.persist(&run)?;
        self.runs
            .lock()
            .expect("run map mutex poisoned")
            .insert(run.id.clone(), run.clone());
        debug!(run = %run.id, subject, total, "Created run");
        Ok(run)
    }

    /// Transition `running → completed`, recording final counters.
    pub fn mark_run_completed(&self, id: &str, stats: RunStats) -> Result<Run, RunError> {
        self.finish(id, RunStatus::Completed, Some(stats))
    }

    /// Transition `running → failed`. Used when startup yields zero usable
    /// providers; counters stay at zero.
    pub fn mark_run_failed(&self, id: &str) -> Result<Run, RunError> {
        self.finish(id, RunStatus::Failed, None)
    }

    pub fn get(&self, id: &str) -> Result<Run, RunError> {
        self.runs
            .lock()
            .expect("run map mutex poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| RunError::NotFound { id: id.to_string() })
    }

    /// All runs, newest first.
    #[must_use]
    pub fn list(&self) -> Vec<Run> {
        let map = self.runs.lock().expect("run map mutex poisoned");
        let mut runs: Vec<Run> = map.values().cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs
    }

    fn finish(
        &self,
        id: &str,
        status: RunStatus,
        stats: Option<RunStats>,
    ) -> Result<Run, RunError> {
        let mut map = self.runs.lock().expect("run map mutex poisoned");
        let run = map
            .get_mut(id)
            .ok_or_else(|| RunError::NotFound { id: id.to_string() })?;

        if run.status.is_terminal() {
            return Err(RunError::AlreadyTerminal {
                id: id.to_string(),
                status: run.status.as_str().to_string(),
            });
        }

        run.status = status;
        run.completed_at = Some(Utc::now());
        if let Some(stats) = stats {
            run.total = stats.total;
            run.successful = stats.successful;
            run.failed = stats.failed;
        }

        let snapshot = run.clone();
        drop(map);

        self.persist(&snapshot)?;
        debug!(run = %snapshot.id, status = snapshot.status.as_str(), "Run finished");
        Ok(snapshot)
    }

    fn persist(&self, run: &Run) -> Result<(), RunError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(run)?;
        write_file_atomic(&record_path(dir, &run.id), &json)?;
        Ok(())
    }
}

fn record_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{id}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RunRepository {
        RunRepository::in_memory()
    }

    #[test]
    fn create_starts_running() {
        let repo = repo();
        let run = repo
            .create_run(Some("evening batch"), "deck", "history", "basic", 10)
            .unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.total, 10);
        assert_eq!(repo.get(&run.id).unwrap().status, RunStatus::Running);
    }

    #[test]
    fn run_ids_are_unique() {
        let repo = repo();
        let a = repo.create_run(None, "deck", "s", "basic", 1).unwrap();
        let b = repo.create_run(None, "deck", "s", "basic", 1).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn completed_records_stats() {
        let repo = repo();
        let run = repo.create_run(None, "deck", "s", "basic", 5).unwrap();
        let done = repo
            .mark_run_completed(
                &run.id,
                RunStats {
                    total: 5,
                    successful: 3,
                    failed: 2,
                },
            )
            .unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.successful, 3);
        assert_eq!(done.failed, 2);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn terminal_transitions_are_exclusive_and_once() {
        let repo = repo();
        let run = repo.create_run(None, "deck", "s", "basic", 1).unwrap();
        repo.mark_run_failed(&run.id).unwrap();

        let err = repo
            .mark_run_completed(&run.id, RunStats::default())
            .unwrap_err();
        assert!(matches!(err, RunError::AlreadyTerminal { .. }));

        let err = repo.mark_run_failed(&run.id).unwrap_err();
        assert!(matches!(err, RunError::AlreadyTerminal { .. }));

        // The first terminal status survives.
        assert_eq!(repo.get(&run.id).unwrap().status, RunStatus::Failed);
    }

    #[test]
    fn unknown_run_is_not_found() {
        let repo = repo();
        assert!(matches!(
            repo.mark_run_failed("run-nope"),
            Err(RunError::NotFound { .. })
        ));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = {
            let repo = RunRepository::open(dir.path()).unwrap();
            let run = repo.create_run(None, "deck", "s", "basic", 2).unwrap();
            repo.mark_run_completed(
                &run.id,
                RunStats {
                    total: 2,
                    successful: 2,
                    failed: 0,
                },
            )
            .unwrap();
            run.id
        };

        let reopened = RunRepository::open(dir.path()).unwrap();
        let run = reopened.get(&run_id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.successful, 2);
    }

    #[test]
    fn list_is_newest_first() {
        let repo = repo();
        let a = repo.create_run(None, "deck", "a", "basic", 1).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = repo.create_run(None, "deck", "b", "basic", 1).unwrap();

        let listed = repo.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, b.id);
        assert_eq!(listed[1].id, a.id);
    }
}
