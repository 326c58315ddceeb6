//! Durable traversal checkpoints.
//!
//! One file per repository records every fully-completed commit. On
//! reload the trailing rows are treated as possibly partially written:
//! any malformed tail row is dropped, then one more valid row as a
//! safety margin, so the store only ever claims commits that were
//! certainly completed. The on-disk content is always a contiguous
//! prefix of the true commit sequence.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use churnscope_core::table::{format_row, split_row};
use churnscope_core::ChurnError;

/// Header of every checkpoint file.
pub const CHECKPOINT_HEADER: &str = "Commit Number,Commit Hash,Commit Message,Commit Date";

/// One completed commit, as recorded in the checkpoint file.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointRow {
    /// 1-based traversal index.
    pub index: usize,
    /// Full commit hash.
    pub hash: String,
    /// First line of the commit message.
    pub message: String,
    /// Commit date, preformatted (`YYYY-MM-DD HH:MM:SS`).
    pub date: String,
}

/// Where to resume a traversal, with a progress report for the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    /// Index of the last certainly-completed commit; traversal restarts
    /// at `resume_index + 1`.
    pub resume_index: usize,
    /// Total commits in the repository.
    pub total_commits: usize,
    /// Percentage already mined.
    pub percent_complete: f64,
    /// Estimated seconds for the remainder, from the configured
    /// historical per-commit duration.
    pub eta_seconds: f64,
}

/// Durable progress record for one repository's traversal.
///
/// Abstracted as a trait so the file-backed store can be swapped for an
/// embedded database without touching the traversal driver.
pub trait CheckpointStore {
    /// Read (or create) the checkpoint and report where to resume.
    fn load(&mut self, total_commits: usize, seconds_per_commit: f64)
        -> Result<ResumePoint, ChurnError>;

    /// Record one completed commit; durable before this returns.
    fn append(&mut self, row: &CheckpointRow) -> Result<(), ChurnError>;

    /// Delete the checkpoint; called only after full completion.
    fn clear(&mut self) -> Result<(), ChurnError>;
}

/// File-backed checkpoint store, one CSV per repository.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use churnscope_mine::checkpoint::{CheckpointStore, CsvCheckpoint};
///
/// let mut store = CsvCheckpoint::new(Path::new("checkpoints"), "junit4");
/// let resume = store.load(5000, 14.0).unwrap();
/// println!("resuming at commit {}", resume.resume_index + 1);
/// ```
pub struct CsvCheckpoint {
    path: PathBuf,
    file: Option<File>,
    last_index: usize,
}

impl CsvCheckpoint {
    /// Create a store for `repo_name` under `checkpoints_dir`. No file
    /// is touched until [`CheckpointStore::load`] runs.
    pub fn new(checkpoints_dir: &Path, repo_name: &str) -> Self {
        Self {
            path: checkpoints_dir.join(format!("{repo_name}.csv")),
            file: None,
            last_index: 0,
        }
    }

    /// The checkpoint file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read-only peek at the last recorded index, without applying the
    /// safety margin or rewriting anything. `None` if no checkpoint
    /// exists. Used by status reporting.
    pub fn peek(path: &Path) -> Result<Option<usize>, ChurnError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let rows = parse_rows(&content);
        Ok(Some(rows.last().map(|r| r.index).unwrap_or(0)))
    }

    fn open_for_append(&mut self) -> Result<(), ChurnError> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.file = Some(file);
        Ok(())
    }
}

fn parse_rows(content: &str) -> Vec<CheckpointRow> {
    let mut rows = Vec::new();
    for line in content.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_row(line);
        if fields.len() != 4 {
            break;
        }
        let Ok(index) = fields[0].parse::<usize>() else {
            break;
        };
        if fields[1].is_empty() {
            break;
        }
        // Indices must be the contiguous continuation of what we have
        // already accepted; anything else marks the corrupt tail.
        if index != rows.len() + 1 {
            break;
        }
        rows.push(CheckpointRow {
            index,
            hash: fields[1].clone(),
            message: fields[2].clone(),
            date: fields[3].clone(),
        });
    }
    rows
}

impl CheckpointStore for CsvCheckpoint {
    fn load(
        &mut self,
        total_commits: usize,
        seconds_per_commit: f64,
    ) -> Result<ResumePoint, ChurnError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let resume_index = if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            let mut rows = parse_rows(&content);
            // A checkpoint can outlive a rewritten or shrunk history;
            // rows past the current commit count describe commits that
            // no longer exist.
            rows.truncate(total_commits);
            // The last surviving row may itself describe a commit whose
            // artifacts were half-written when the process died; drop it
            // as a safety margin and redo that commit.
            rows.pop();

            let mut file = File::create(&self.path)?;
            writeln!(file, "{CHECKPOINT_HEADER}")?;
            for row in &rows {
                let line = format_row(&[
                    row.index.to_string(),
                    row.hash.clone(),
                    row.message.clone(),
                    row.date.clone(),
                ]);
                writeln!(file, "{line}")?;
            }
            file.sync_all()?;
            rows.last().map(|r| r.index).unwrap_or(0)
        } else {
            let mut file = File::create(&self.path)?;
            writeln!(file, "{CHECKPOINT_HEADER}")?;
            file.sync_all()?;
            0
        };

        self.last_index = resume_index;
        self.open_for_append()?;

        let remaining = total_commits.saturating_sub(resume_index);
        let percent_complete = if total_commits == 0 {
            100.0
        } else {
            resume_index as f64 / total_commits as f64 * 100.0
        };
        Ok(ResumePoint {
            resume_index,
            total_commits,
            percent_complete,
            eta_seconds: remaining as f64 * seconds_per_commit,
        })
    }

    fn append(&mut self, row: &CheckpointRow) -> Result<(), ChurnError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| ChurnError::Config("checkpoint appended before load".into()))?;
        if row.index != self.last_index + 1 {
            return Err(ChurnError::Config(format!(
                "checkpoint rows must be contiguous: expected index {}, got {}",
                self.last_index + 1,
                row.index
            )));
        }
        let line = format_row(&[
            row.index.to_string(),
            row.hash.clone(),
            row.message.clone(),
            row.date.clone(),
        ]);
        writeln!(file, "{line}")?;
        file.sync_data()?;
        self.last_index = row.index;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), ChurnError> {
        self.file = None;
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(index: usize) -> CheckpointRow {
        CheckpointRow {
            index,
            hash: format!("hash{index:032}"),
            message: format!("commit {index}"),
            date: "2021-04-01 12:00:00".into(),
        }
    }

    #[test]
    fn fresh_load_creates_header_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvCheckpoint::new(dir.path(), "demo");
        let resume = store.load(100, 10.0).unwrap();

        assert_eq!(resume.resume_index, 0);
        assert_eq!(resume.percent_complete, 0.0);
        assert_eq!(resume.eta_seconds, 1000.0);

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.trim(), CHECKPOINT_HEADER);
    }

    #[test]
    fn append_then_reload_applies_safety_margin() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvCheckpoint::new(dir.path(), "demo");
        store.load(10, 1.0).unwrap();
        for i in 1..=6 {
            store.append(&row(i)).unwrap();
        }

        let mut store = CsvCheckpoint::new(dir.path(), "demo");
        let resume = store.load(10, 1.0).unwrap();
        // All six rows are valid; one is dropped as margin.
        assert_eq!(resume.resume_index, 5);
        assert_eq!(resume.percent_complete, 50.0);
    }

    #[test]
    fn truncated_trailing_row_is_dropped_plus_margin() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvCheckpoint::new(dir.path(), "demo");
        store.load(10, 1.0).unwrap();
        for i in 1..=5 {
            store.append(&row(i)).unwrap();
        }
        // Simulate a crash mid-write: a sixth row missing its tail.
        drop(store);
        let path = dir.path().join("demo.csv");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("6,abcdef");
        std::fs::write(&path, content).unwrap();

        let mut store = CsvCheckpoint::new(dir.path(), "demo");
        let resume = store.load(10, 1.0).unwrap();
        // Truncated row dropped, plus row 5 as the safety margin.
        assert_eq!(resume.resume_index, 4);
    }

    #[test]
    fn appends_are_monotonic_and_contiguous() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvCheckpoint::new(dir.path(), "demo");
        store.load(10, 1.0).unwrap();
        store.append(&row(1)).unwrap();
        store.append(&row(2)).unwrap();
        // A gap is a programming error, not silently recorded.
        assert!(store.append(&row(4)).is_err());
        // Going backwards is equally rejected.
        assert!(store.append(&row(2)).is_err());
    }

    #[test]
    fn resume_continues_from_margin_point() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvCheckpoint::new(dir.path(), "demo");
        store.load(4, 1.0).unwrap();
        store.append(&row(1)).unwrap();
        store.append(&row(2)).unwrap();

        let mut store = CsvCheckpoint::new(dir.path(), "demo");
        let resume = store.load(4, 1.0).unwrap();
        assert_eq!(resume.resume_index, 1);
        // The traversal redoes commit 2, then continues.
        store.append(&row(2)).unwrap();
        store.append(&row(3)).unwrap();
        store.append(&row(4)).unwrap();

        let content = std::fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[1].starts_with("1,"));
        assert!(lines[4].starts_with("4,"));
    }

    #[test]
    fn shrunk_history_clamps_resume_point() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvCheckpoint::new(dir.path(), "demo");
        store.load(10, 1.0).unwrap();
        for i in 1..=8 {
            store.append(&row(i)).unwrap();
        }

        // The history was rewritten down to 4 commits since the last run.
        let mut store = CsvCheckpoint::new(dir.path(), "demo");
        let resume = store.load(4, 1.0).unwrap();
        assert_eq!(resume.resume_index, 3);
        assert!(resume.percent_complete <= 100.0);
        // The rewritten file holds only the clamped prefix, so appends
        // continue from commit 4.
        store.append(&row(4)).unwrap();
        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content.lines().count(), 5);
    }

    #[test]
    fn gap_in_persisted_rows_truncates_from_gap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.csv");
        let mut content = format!("{CHECKPOINT_HEADER}\n");
        content.push_str("1,h1,m1,d1\n");
        content.push_str("2,h2,m2,d2\n");
        content.push_str("5,h5,m5,d5\n");
        std::fs::write(&path, content).unwrap();

        let mut store = CsvCheckpoint::new(dir.path(), "demo");
        let resume = store.load(10, 1.0).unwrap();
        // Rows after the gap are untrusted; margin drops row 2 as well.
        assert_eq!(resume.resume_index, 1);
    }

    #[test]
    fn clear_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvCheckpoint::new(dir.path(), "demo");
        store.load(1, 1.0).unwrap();
        store.append(&row(1)).unwrap();
        store.clear().unwrap();
        assert!(!dir.path().join("demo.csv").exists());
    }

    #[test]
    fn peek_does_not_modify() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CsvCheckpoint::new(dir.path(), "demo");
        store.load(10, 1.0).unwrap();
        store.append(&row(1)).unwrap();
        store.append(&row(2)).unwrap();
        drop(store);

        let path = dir.path().join("demo.csv");
        let before = std::fs::read_to_string(&path).unwrap();
        assert_eq!(CsvCheckpoint::peek(&path).unwrap(), Some(2));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        assert_eq!(
            CsvCheckpoint::peek(&dir.path().join("absent.csv")).unwrap(),
            None
        );
    }
}
