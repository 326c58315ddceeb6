//! Bounded-concurrency mining across repositories.
//!
//! One logical worker per repository, at most `max_workers` running at a
//! time. Each worker gets its own working copy, checkpoint store, and
//! blocking thread; nothing is shared between workers, so no locks are
//! needed around the checkout-then-analyze sequence. A failure in one
//! worker is recorded in the run summary and never terminates siblings.

use std::sync::Arc;

use churnscope_core::{ChurnConfig, ChurnError, RepoSpec};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::checkpoint::CsvCheckpoint;
use crate::traversal::{traverse, TraversalEvent, TraversalOutcome};

/// Callback receiving `(repository name, event)` pairs from all workers.
pub type RepoEventSink = dyn Fn(&str, TraversalEvent) + Send + Sync;

/// Outcome of one repository's worker, error or not.
#[derive(Debug)]
pub struct RepoReport {
    /// Repository name.
    pub name: String,
    /// The traversal result; a fatal per-repository error lands here
    /// instead of aborting the run.
    pub outcome: Result<TraversalOutcome, ChurnError>,
}

/// Mine every repository in `specs`, at most `config.mining.max_workers`
/// concurrently.
///
/// Before a repository starts, a best-effort duration estimate (its
/// configured commit count times the historical per-commit constant) is
/// emitted through the sink as [`TraversalEvent::DurationProjected`].
/// Reports come back in completion order.
pub async fn mine_all(
    config: Arc<ChurnConfig>,
    specs: Vec<RepoSpec>,
    on_event: Arc<RepoEventSink>,
) -> Vec<RepoReport> {
    let semaphore = Arc::new(Semaphore::new(config.mining.max_workers.max(1)));
    let mut workers = JoinSet::new();

    for spec in specs {
        let config = Arc::clone(&config);
        let on_event = Arc::clone(&on_event);
        let semaphore = Arc::clone(&semaphore);

        workers.spawn(async move {
            // A closed semaphore cannot happen; it lives as long as the set.
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");

            if let Some(total) = spec.commits {
                let estimate = total as f64 * config.mining.seconds_per_commit;
                on_event(
                    &spec.name,
                    TraversalEvent::DurationProjected {
                        total_seconds: estimate,
                    },
                );
            }

            let name = spec.name.clone();
            let result = tokio::task::spawn_blocking(move || {
                let mut store = CsvCheckpoint::new(&config.paths.checkpoints_dir, &spec.name);
                let sink = |event: TraversalEvent| on_event(&spec.name, event);
                traverse(&spec, &config, &mut store, &sink)
            })
            .await;

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(join_err) => Err(ChurnError::Git(format!(
                    "worker for {name} panicked: {join_err}"
                ))),
            };
            RepoReport { name, outcome }
        });
    }

    let mut reports = Vec::new();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(join_err) => reports.push(RepoReport {
                name: "<unknown>".into(),
                outcome: Err(ChurnError::Git(format!("worker panicked: {join_err}"))),
            }),
        }
    }
    reports
}
