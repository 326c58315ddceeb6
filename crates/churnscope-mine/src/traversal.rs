//! The per-repository traversal driver.
//!
//! Walks the commit sequence strictly oldest-first from the checkpoint's
//! resume point. For each commit it writes diff artifacts, checks the
//! commit out, runs the analyzer, and appends a checkpoint row. A failed
//! analyzer invocation costs that commit its snapshots but never aborts
//! the traversal; the checkpoint still advances so the commit is not
//! redone on resume.

use std::path::Path;
use std::time::Instant;

use chrono::{TimeZone, Utc};
use churnscope_core::table::format_row;
use churnscope_core::{
    commit_dir_name, ChurnConfig, ChurnError, CommitMeta, RepoSpec, COMMIT_LIST_FILE,
    COMMIT_LIST_HEADER,
};

use crate::analyzer::MetricsAnalyzer;
use crate::checkpoint::{CheckpointRow, CheckpointStore};
use crate::repo::{ensure_local_copy, validate_worktree_path, LocalRepo};

/// Progress notifications emitted while a repository is traversed.
#[derive(Debug)]
pub enum TraversalEvent {
    /// Checkpoint loaded; mining (re)starts after `resume_index`.
    Resumed {
        /// Last certainly-completed commit index.
        resume_index: usize,
        /// Total commits in the repository.
        total_commits: usize,
        /// Percent already mined.
        percent_complete: f64,
        /// Estimated seconds remaining, from the historical constant.
        eta_seconds: f64,
    },
    /// Projection from the measured duration of the first processed
    /// commit, replacing the historical estimate.
    DurationProjected {
        /// Estimated seconds for all remaining commits.
        total_seconds: f64,
    },
    /// One commit fully mined.
    CommitMined {
        /// Traversal index.
        index: usize,
        /// Full commit hash.
        hash: String,
    },
    /// Analyzer failed for one commit; its metrics are missing but the
    /// traversal continues.
    CommitFailed {
        /// Traversal index.
        index: usize,
        /// Full commit hash.
        hash: String,
        /// Failure description.
        reason: String,
    },
    /// Non-fatal oddity worth surfacing (e.g. a fetch failure).
    Warning(String),
    /// Traversal finished; checkpoint cleared.
    Completed {
        /// Commits processed this run.
        processed: usize,
        /// Commits whose analyzer invocation failed this run.
        failed: usize,
    },
}

/// Callback receiving [`TraversalEvent`]s.
pub type EventSink<'a> = dyn Fn(TraversalEvent) + Send + Sync + 'a;

/// Summary of one repository's traversal run.
#[derive(Debug)]
pub struct TraversalOutcome {
    /// Repository name.
    pub repo: String,
    /// Total commits in the sequence.
    pub total_commits: usize,
    /// Index the run resumed after (0 for a fresh run).
    pub resumed_from: usize,
    /// Commits processed in this run.
    pub processed: usize,
    /// Indices whose analyzer invocation failed in this run.
    pub failed_commits: Vec<usize>,
}

/// Mine one repository end to end, honoring any existing checkpoint.
///
/// On completion the default branch is checked out again, the
/// commit-hash list is exported, and the checkpoint file is deleted.
///
/// # Errors
///
/// Fatal errors only: [`ChurnError::InvalidEnvironment`] from the
/// pre-flight path check, [`ChurnError::MissingDependency`] for an
/// uncloneable repository or absent analyzer binary, and I/O or git
/// failures on the traversal's own bookkeeping. Per-commit analyzer
/// failures are reported through the event sink instead.
pub fn traverse(
    spec: &RepoSpec,
    config: &ChurnConfig,
    store: &mut dyn CheckpointStore,
    on_event: &EventSink<'_>,
) -> Result<TraversalOutcome, ChurnError> {
    let worktree = spec.local_path(&config.paths.repos_dir);
    validate_worktree_path(&worktree)?;

    let local = ensure_local_copy(spec, &config.paths.repos_dir)?;
    if let Err(e) = local.freshen() {
        on_event(TraversalEvent::Warning(format!(
            "{}: continuing with stale copy: {e}",
            spec.name
        )));
    }

    let commits = local.commit_sequence()?;
    let total_commits = commits.len();

    let resume = store.load(total_commits, config.mining.seconds_per_commit)?;
    on_event(TraversalEvent::Resumed {
        resume_index: resume.resume_index,
        total_commits,
        percent_complete: resume.percent_complete,
        eta_seconds: resume.eta_seconds,
    });

    let analyzer = MetricsAnalyzer::new(&config.analyzer);
    let diffs_root = config.paths.diffs_dir.join(&spec.name);
    let metrics_root = config.paths.metrics_dir.join(&spec.name);
    std::fs::create_dir_all(&metrics_root)?;

    let mut processed = 0usize;
    let mut failed_commits = Vec::new();
    let mut first_commit_timer: Option<Instant> = Some(Instant::now());

    for commit in commits.iter().skip(resume.resume_index) {
        let started = Instant::now();

        write_diff_artifacts(&local, commit, &diffs_root)?;
        local.checkout_commit(&commit.hash)?;

        let out_dir = metrics_root.join(commit_dir_name(commit.index, &commit.hash));
        match analyzer.run(&worktree, &out_dir, &worktree) {
            Ok(_) => {}
            Err(e) if e.is_fatal_for_repo() => return Err(e),
            Err(e) => {
                failed_commits.push(commit.index);
                on_event(TraversalEvent::CommitFailed {
                    index: commit.index,
                    hash: commit.hash.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if first_commit_timer.take().is_some() {
            let remaining = total_commits - resume.resume_index;
            let total_seconds = started.elapsed().as_secs_f64() * remaining as f64;
            on_event(TraversalEvent::DurationProjected { total_seconds });
        }

        store.append(&CheckpointRow {
            index: commit.index,
            hash: commit.hash.clone(),
            message: commit.message.clone(),
            date: format_date(commit.timestamp),
        })?;
        processed += 1;

        if !failed_commits.contains(&commit.index) {
            on_event(TraversalEvent::CommitMined {
                index: commit.index,
                hash: commit.hash.clone(),
            });
        }
    }

    export_commit_list(&metrics_root, &commits)?;
    if total_commits > 0 {
        local.checkout_default_branch()?;
    }
    store.clear()?;

    on_event(TraversalEvent::Completed {
        processed,
        failed: failed_commits.len(),
    });
    Ok(TraversalOutcome {
        repo: spec.name.clone(),
        total_commits,
        resumed_from: resume.resume_index,
        processed,
        failed_commits,
    })
}

fn write_diff_artifacts(
    local: &LocalRepo,
    commit: &CommitMeta,
    diffs_root: &Path,
) -> Result<(), ChurnError> {
    let dir = diffs_root.join(commit_dir_name(commit.index, &commit.hash));
    std::fs::create_dir_all(&dir)?;
    for (path, text) in local.file_diffs(&commit.hash)? {
        let name = format!("{}.diff", sanitize_path(&path));
        std::fs::write(dir.join(name), text)?;
    }
    Ok(())
}

fn sanitize_path(path: &str) -> String {
    path.replace(['/', '\\'], "_")
}

fn export_commit_list(metrics_root: &Path, commits: &[CommitMeta]) -> Result<(), ChurnError> {
    let mut content = String::from(COMMIT_LIST_HEADER);
    content.push('\n');
    for commit in commits {
        let line = format_row(&[
            commit.hash.clone(),
            commit.message.clone(),
            format_date(commit.timestamp),
        ]);
        content.push_str(&line);
        content.push('\n');
    }
    std::fs::write(metrics_root.join(COMMIT_LIST_FILE), content)?;
    Ok(())
}

fn format_date(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => String::from("1970-01-01 00:00:00"),
    }
}
