//! Bounded-concurrency execution of independent pipeline tasks.
//!
//! A semaphore caps how many tasks run at once; a `JoinSet` owns the
//! spawned futures. Tasks are independent by construction, so one task's
//! failure (a `None` result) never cancels its siblings.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Runs a batch of homogeneous async tasks with a global concurrency cap.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl TaskRunner {
    /// `limit` is clamped to at least 1.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run every task, at most `limit` concurrently, and collect the `Some`
    /// results. Completion order is not preserved. Panicked tasks are logged
    /// and counted as failed; the rest of the batch proceeds.
    pub async fn run_all<T, F, Fut>(&self, tasks: Vec<F>) -> Vec<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        let total = tasks.len();
        let mut join_set = JoinSet::new();
        for task in tasks {
            let semaphore = Arc::clone(&self.semaphore);
            join_set.spawn(async move {
                // Closing the semaphore is not part of this type's surface,
                // so acquisition cannot fail.
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .unwrap_or_else(|_| unreachable!("semaphore never closed"));
                task().await
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Some(value)) => results.push(value),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Task panicked; continuing with remaining tasks"),
            }
        }
        debug!(
            total,
            successful = results.len(),
            limit = self.limit,
            "Task batch complete"
        );
        results
    }
}
