//! External metrics analyzer invocation.
//!
//! The analyzer is a separate program run once per checked-out commit:
//! `<binary> <worktree> <flags...> <output-dir>`. It writes class-level
//! and method-level tabular files into the output directory. Invocation
//! is synchronous; the traversal worker blocks until it exits.

use std::path::{Path, PathBuf};
use std::process::Command;

use churnscope_core::{AnalyzerConfig, ChurnError};

/// Runs the configured analyzer binary with an explicit working
/// directory for every invocation. The process-global current directory
/// is never touched, so concurrent repository workers cannot race on it.
pub struct MetricsAnalyzer {
    binary: PathBuf,
    flags: Vec<String>,
}

/// Captured output of one successful analyzer run, surfaced under
/// verbose logging.
#[derive(Debug, Default)]
pub struct AnalyzerRun {
    /// Analyzer stdout, lossily decoded.
    pub stdout: String,
    /// Analyzer stderr, lossily decoded.
    pub stderr: String,
}

impl MetricsAnalyzer {
    /// Build an analyzer from configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use churnscope_core::AnalyzerConfig;
    /// use churnscope_mine::analyzer::MetricsAnalyzer;
    ///
    /// let analyzer = MetricsAnalyzer::new(&AnalyzerConfig::default());
    /// ```
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            flags: config.flags.clone(),
        }
    }

    /// Analyze `worktree`, writing tabular output into `out_dir`.
    ///
    /// The subprocess runs with `invoke_dir` as its working directory.
    ///
    /// # Errors
    ///
    /// - [`ChurnError::MissingDependency`] if the binary does not exist:
    ///   fatal for the repository, no commit can ever succeed.
    /// - [`ChurnError::ToolInvocation`] if the analyzer starts but exits
    ///   non-zero or crashes: recoverable, costs this commit its
    ///   snapshots.
    pub fn run(
        &self,
        worktree: &Path,
        out_dir: &Path,
        invoke_dir: &Path,
    ) -> Result<AnalyzerRun, ChurnError> {
        std::fs::create_dir_all(out_dir)?;

        let output = Command::new(&self.binary)
            .arg(worktree)
            .args(&self.flags)
            .arg(out_dir)
            .current_dir(invoke_dir)
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ChurnError::MissingDependency(format!(
                        "analyzer binary {} not found",
                        self.binary.display()
                    ))
                } else {
                    ChurnError::ToolInvocation(format!(
                        "failed to start {}: {e}",
                        self.binary.display()
                    ))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut last_lines: Vec<&str> = stderr.lines().rev().take(3).collect();
            last_lines.reverse();
            let tail = last_lines.join(" | ");
            return Err(ChurnError::ToolInvocation(format!(
                "{} exited with {} on {}: {tail}",
                self.binary.display(),
                output.status,
                worktree.display()
            )));
        }

        Ok(AnalyzerRun {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
