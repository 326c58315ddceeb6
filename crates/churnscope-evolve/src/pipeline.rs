//! Orchestration of the evolution stage for one repository.
//!
//! Reads the commit list the mining stage exported, walks the per-commit
//! metrics directories in traversal order, feeds the tracker, and writes
//! the timeline and statistics reports. All paths come from the
//! configuration, whose relative entries the caller anchors once at
//! startup; the process CWD is never consulted, and both stages see the
//! same directories.

use std::path::{Path, PathBuf};

use churnscope_core::table::split_row;
use churnscope_core::{
    commit_dir_name, ChurnConfig, ChurnError, EntityEvolution, EntityMode, Result,
    COMMIT_LIST_FILE, COMMIT_LIST_HEADER,
};

use crate::parser::parse_metrics_file;
use crate::stats::{compute_stats, write_evolutions, write_statistics};
use crate::tracker::EvolutionTracker;

/// One row of the exported commit list, in traversal order.
#[derive(Debug, Clone)]
pub struct ListedCommit {
    /// 1-based traversal index (the row's position in the list).
    pub index: usize,
    /// Full commit hash.
    pub hash: String,
    /// First line of the commit message.
    pub message: String,
    /// Commit date as the mining stage formatted it.
    pub date: String,
}

/// Timelines built from a fully mined repository.
#[derive(Debug)]
pub struct BuildOutcome {
    /// Commits covered by the commit list.
    pub total_commits: usize,
    /// Indices of commits whose metrics file was unusable.
    pub failed_commits: Vec<usize>,
    /// Malformed rows skipped across all commits.
    pub skipped_rows: usize,
    /// One evolution per observed entity, sorted by entity.
    pub evolutions: Vec<EntityEvolution>,
}

/// What the evolution stage wrote for one repository.
#[derive(Debug)]
pub struct EvolveReport {
    pub repo: String,
    pub total_commits: usize,
    pub failed_commits: Vec<usize>,
    pub skipped_rows: usize,
    /// Entities observed across the whole history.
    pub entities: usize,
    /// Entities that met the change threshold and were written out.
    pub reported: usize,
    /// The ranked statistics file, when this run produced one.
    pub statistics_path: Option<PathBuf>,
}

/// Read the commit list exported by a completed traversal.
///
/// # Errors
///
/// [`ChurnError::IncompleteMining`] when the list is absent, meaning the
/// traversal never ran to completion for this repository.
/// [`ChurnError::MalformedRow`] when the list itself is damaged; the
/// list is machine-written, so damage is not recoverable row by row.
pub fn load_commit_list(metrics_repo_dir: &Path) -> Result<Vec<ListedCommit>> {
    let path = metrics_repo_dir.join(COMMIT_LIST_FILE);
    if !path.exists() {
        return Err(ChurnError::IncompleteMining(format!(
            "no {} under {}; run mining to completion first",
            COMMIT_LIST_FILE,
            metrics_repo_dir.display()
        )));
    }
    let content = std::fs::read_to_string(&path)?;
    let file_name = path.display().to_string();

    let mut lines = content.lines().enumerate();
    match lines.next() {
        Some((_, header)) if header == COMMIT_LIST_HEADER => {}
        _ => {
            return Err(ChurnError::MalformedRow {
                file: file_name,
                line: 1,
                reason: format!("expected header `{COMMIT_LIST_HEADER}`"),
            })
        }
    }

    let mut commits = Vec::new();
    for (line_no, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_row(line);
        if fields.len() < 3 || fields[0].is_empty() {
            return Err(ChurnError::MalformedRow {
                file: file_name,
                line: line_no + 1,
                reason: "expected hash, message, date".into(),
            });
        }
        commits.push(ListedCommit {
            index: commits.len() + 1,
            hash: fields[0].clone(),
            message: fields[1].clone(),
            date: fields[2].clone(),
        });
    }
    Ok(commits)
}

/// Build the per-entity timelines for one fully mined repository.
///
/// Walks the commit list in order, parsing each commit's metrics file
/// for the configured entity mode. A commit whose file has an unusable
/// header is recorded in `failed_commits` and contributes no snapshots;
/// the pass continues. A commit with no metrics file at all contributes
/// an empty snapshot set silently, matching how the traversal records
/// analyzer failures.
///
/// # Errors
///
/// [`ChurnError::IncompleteMining`] when the commit list is missing or
/// a traversal checkpoint still exists for the repository, meaning
/// mining was interrupted and must be resumed before evolution runs.
pub fn build_timelines(config: &ChurnConfig, repo_name: &str) -> Result<BuildOutcome> {
    let checkpoint = config
        .paths
        .checkpoints_dir
        .join(format!("{repo_name}.csv"));
    if checkpoint.exists() {
        return Err(ChurnError::IncompleteMining(format!(
            "checkpoint {} still exists; mining of `{repo_name}` was interrupted",
            checkpoint.display()
        )));
    }

    let metrics_repo_dir = config.paths.metrics_dir.join(repo_name);
    let commits = load_commit_list(&metrics_repo_dir)?;

    let file_name = match config.evolution.mode {
        EntityMode::Class => &config.analyzer.class_file,
        EntityMode::Method => &config.analyzer.method_file,
    };

    let mut tracker = EvolutionTracker::new();
    let mut failed_commits = Vec::new();
    let mut skipped_rows = 0;
    for commit in &commits {
        let metrics_file = metrics_repo_dir
            .join(commit_dir_name(commit.index, &commit.hash))
            .join(file_name);
        let parsed = match parse_metrics_file(
            &metrics_file,
            config.evolution.mode,
            commit.index,
            &commit.hash,
            &config.evolution.source_root_marker,
        ) {
            Ok(parsed) => parsed,
            Err(ChurnError::MalformedRow { .. }) => {
                failed_commits.push(commit.index);
                Default::default()
            }
            Err(other) => return Err(other),
        };
        skipped_rows += parsed.skipped_rows;
        tracker.observe_commit(commit.index, &parsed.snapshots)?;
    }

    Ok(BuildOutcome {
        total_commits: commits.len(),
        failed_commits,
        skipped_rows,
        evolutions: tracker.finish(),
    })
}

/// Run the evolution stage: build timelines and write the per-entity
/// timeline files.
pub fn run_evolution(config: &ChurnConfig, repo_name: &str) -> Result<EvolveReport> {
    let outcome = build_timelines(config, repo_name)?;
    let reported = reportable(&outcome.evolutions, config.evolution.min_changes);
    let out_dir = results_dir(config, repo_name);
    write_evolutions(&out_dir, config.evolution.mode, &reported)?;
    Ok(report(repo_name, outcome, reported.len(), None))
}

/// Run the aggregation stage: build timelines and write the ranked
/// statistics file.
pub fn run_stats(config: &ChurnConfig, repo_name: &str, min_changes: usize) -> Result<EvolveReport> {
    let outcome = build_timelines(config, repo_name)?;
    let stats = compute_stats(&outcome.evolutions, min_changes);
    let out_dir = results_dir(config, repo_name);
    let path = write_statistics(&out_dir, config.evolution.mode, &stats)?;
    let reported = stats.len();
    Ok(report(repo_name, outcome, reported, Some(path)))
}

fn results_dir(config: &ChurnConfig, repo_name: &str) -> PathBuf {
    config.paths.results_dir.join(repo_name)
}

fn reportable(evolutions: &[EntityEvolution], min_changes: usize) -> Vec<EntityEvolution> {
    evolutions
        .iter()
        .filter(|e| e.change_count() >= min_changes)
        .cloned()
        .collect()
}

fn report(
    repo_name: &str,
    outcome: BuildOutcome,
    reported: usize,
    statistics_path: Option<PathBuf>,
) -> EvolveReport {
    EvolveReport {
        repo: repo_name.to_string(),
        total_commits: outcome.total_commits,
        failed_commits: outcome.failed_commits,
        skipped_rows: outcome.skipped_rows,
        entities: outcome.evolutions.len(),
        reported,
        statistics_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use churnscope_core::table::format_row;

    const CLASS_HEADER: &str = "file,class,type,cbo,cboModified,wmc,rfc";

    /// A config whose directories all live under `root`, the way the
    /// binary anchors them before handing the config over.
    fn config_at(root: &Path) -> ChurnConfig {
        let mut config = ChurnConfig::default();
        config.paths.metrics_dir = root.join("metrics");
        config.paths.checkpoints_dir = root.join("checkpoints");
        config.paths.results_dir = root.join("results");
        config
    }

    /// Lay out a mined metrics tree for `repo` with one class row per
    /// commit. `rows[i]` is `(class, cbo)` for commit `i + 1`.
    fn seed_metrics(root: &Path, repo: &str, rows: &[(&str, f64)]) {
        let repo_dir = root.join("metrics").join(repo);
        let mut list = vec![COMMIT_LIST_HEADER.to_string()];
        for (i, (class, cbo)) in rows.iter().enumerate() {
            let index = i + 1;
            let hash = format!("{index:0>40}");
            list.push(format_row(&[
                hash.clone(),
                format!("commit {index}"),
                "2024-01-01 00:00:00".into(),
            ]));
            let dir = repo_dir.join(commit_dir_name(index, &hash));
            fs::create_dir_all(&dir).unwrap();
            fs::write(
                dir.join("class.csv"),
                format!("{CLASS_HEADER}\n/src/{class}.java,org.{class},class,{cbo},{cbo},5,5\n"),
            )
            .unwrap();
        }
        fs::write(repo_dir.join(COMMIT_LIST_FILE), list.join("\n") + "\n").unwrap();
    }

    #[test]
    fn missing_commit_list_is_incomplete_mining() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_timelines(&config_at(dir.path()), "ghost").unwrap_err();
        assert!(matches!(err, ChurnError::IncompleteMining(_)));
    }

    #[test]
    fn lingering_checkpoint_blocks_evolution() {
        let dir = tempfile::tempdir().unwrap();
        seed_metrics(dir.path(), "demo", &[("App", 1.0)]);
        fs::create_dir_all(dir.path().join("checkpoints")).unwrap();
        fs::write(dir.path().join("checkpoints/demo.csv"), "partial").unwrap();

        let err = build_timelines(&config_at(dir.path()), "demo").unwrap_err();
        assert!(matches!(err, ChurnError::IncompleteMining(_)));

        fs::remove_file(dir.path().join("checkpoints/demo.csv")).unwrap();
        assert!(build_timelines(&config_at(dir.path()), "demo").is_ok());
    }

    #[test]
    fn timelines_deduplicate_across_commits() {
        let dir = tempfile::tempdir().unwrap();
        seed_metrics(
            dir.path(),
            "demo",
            &[("App", 2.0), ("App", 2.0), ("App", 3.0)],
        );

        let outcome = build_timelines(&config_at(dir.path()), "demo").unwrap();
        assert_eq!(outcome.total_commits, 3);
        assert!(outcome.failed_commits.is_empty());
        assert_eq!(outcome.evolutions.len(), 1);
        assert_eq!(outcome.evolutions[0].change_count(), 2);
    }

    #[test]
    fn commit_without_metrics_file_is_silently_empty() {
        let dir = tempfile::tempdir().unwrap();
        seed_metrics(dir.path(), "demo", &[("App", 2.0), ("App", 3.0)]);
        // Simulate an analyzer failure at commit 2.
        let hash2 = format!("{:0>40}", 2);
        fs::remove_file(
            dir.path()
                .join("metrics/demo")
                .join(commit_dir_name(2, &hash2))
                .join("class.csv"),
        )
        .unwrap();

        let outcome = build_timelines(&config_at(dir.path()), "demo").unwrap();
        assert!(outcome.failed_commits.is_empty());
        assert_eq!(outcome.evolutions[0].change_count(), 1);
    }

    #[test]
    fn broken_header_marks_commit_failed_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        seed_metrics(dir.path(), "demo", &[("App", 2.0), ("App", 2.0), ("App", 3.0)]);
        let hash2 = format!("{:0>40}", 2);
        fs::write(
            dir.path()
                .join("metrics/demo")
                .join(commit_dir_name(2, &hash2))
                .join("class.csv"),
            "not,a,real,header\nx,y,z,w\n",
        )
        .unwrap();

        let outcome = build_timelines(&config_at(dir.path()), "demo").unwrap();
        assert_eq!(outcome.failed_commits, vec![2]);
        // Commits 1 and 3 still contribute: 2.0 then 3.0.
        assert_eq!(outcome.evolutions[0].change_count(), 2);
    }

    #[test]
    fn run_evolution_writes_timeline_files_for_busy_entities() {
        let dir = tempfile::tempdir().unwrap();
        seed_metrics(
            dir.path(),
            "demo",
            &[("App", 1.0), ("App", 2.0), ("App", 3.0)],
        );

        let report = run_evolution(&config_at(dir.path()), "demo").unwrap();
        assert_eq!(report.entities, 1);
        assert_eq!(report.reported, 1);
        let file = dir
            .path()
            .join("results/demo/evolutions/org.App_class.csv");
        let body = fs::read_to_string(file).unwrap();
        assert_eq!(body.lines().count(), 4); // header + 3 points
    }

    #[test]
    fn run_stats_writes_only_the_sorted_file() {
        let dir = tempfile::tempdir().unwrap();
        seed_metrics(
            dir.path(),
            "demo",
            &[("App", 1.0), ("App", 2.0), ("App", 2.0)],
        );

        let report = run_stats(&config_at(dir.path()), "demo", 2).unwrap();
        let path = report.statistics_path.unwrap();
        assert!(path.ends_with("results/demo/statistics-sorted.csv"));
        assert!(path.exists());
        assert!(!dir.path().join("results/demo/statistics.csv").exists());

        let body = fs::read_to_string(path).unwrap();
        let row = body.lines().nth(1).unwrap();
        assert!(row.starts_with("org.App,class,2,"));
    }

    #[test]
    fn commit_list_rejects_foreign_header() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("metrics/demo");
        fs::create_dir_all(&repo_dir).unwrap();
        fs::write(repo_dir.join(COMMIT_LIST_FILE), "a,b\n1,2\n").unwrap();
        let err = load_commit_list(&repo_dir).unwrap_err();
        assert!(matches!(err, ChurnError::MalformedRow { line: 1, .. }));
    }

    #[test]
    fn quoted_commit_messages_round_trip_through_the_list() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("metrics/demo");
        fs::create_dir_all(&repo_dir).unwrap();
        let row = format_row(&["abc123", "fix: handle \"quoted, strings\"", "2024-01-01"]);
        fs::write(
            repo_dir.join(COMMIT_LIST_FILE),
            format!("{COMMIT_LIST_HEADER}\n{row}\n"),
        )
        .unwrap();

        let commits = load_commit_list(&repo_dir).unwrap();
        assert_eq!(commits[0].message, "fix: handle \"quoted, strings\"");
        assert_eq!(commits[0].index, 1);
    }
}
