use std::path::PathBuf;

/// Errors that can occur across the churnscope pipeline.
///
/// Each variant wraps a specific failure domain and is contained at the
/// smallest unit that can absorb it: a malformed analyzer row is skipped,
/// a failed tool invocation costs one commit its snapshots, and a missing
/// dependency aborts one repository's worker while siblings continue.
/// Library crates use this type directly; the binary crate converts to
/// `miette` diagnostics at the boundary.
///
/// # Examples
///
/// ```
/// use churnscope_core::ChurnError;
///
/// let err = ChurnError::Config("no repositories configured".into());
/// assert!(err.to_string().contains("no repositories"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ChurnError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Git operation failure.
    #[error("git error: {0}")]
    Git(String),

    /// A required external dependency is unusable: the local working copy
    /// is absent and cloning failed, or the analyzer binary is missing.
    /// Fatal for the affected repository.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// The analyzer exited non-zero or crashed for one commit.
    /// Recoverable: the commit contributes no snapshots.
    #[error("analyzer invocation failed: {0}")]
    ToolInvocation(String),

    /// One unparsable line in an analyzer output file.
    /// Recoverable: the row is skipped, the rest of the file is processed.
    #[error("malformed row in {file} at line {line}: {reason}")]
    MalformedRow {
        /// File the row came from.
        file: String,
        /// 1-based line number.
        line: usize,
        /// What failed to parse.
        reason: String,
    },

    /// The working-copy path cannot be passed to the external analyzer.
    /// Fatal, detected before any work begins.
    #[error("invalid environment: {0}")]
    InvalidEnvironment(String),

    /// Evolution was requested for a repository whose mining did not
    /// run to completion.
    #[error("incomplete mining: {0}")]
    IncompleteMining(String),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl ChurnError {
    /// Whether this error aborts a whole repository's worker rather than
    /// a single commit or row.
    pub fn is_fatal_for_repo(&self) -> bool {
        matches!(
            self,
            ChurnError::MissingDependency(_) | ChurnError::InvalidEnvironment(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ChurnError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn malformed_row_shows_location() {
        let err = ChurnError::MalformedRow {
            file: "class.csv".into(),
            line: 12,
            reason: "expected 7 columns, got 5".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("class.csv"));
        assert!(msg.contains("line 12"));
    }

    #[test]
    fn fatality_is_per_repository() {
        assert!(ChurnError::MissingDependency("ck.jar".into()).is_fatal_for_repo());
        assert!(ChurnError::InvalidEnvironment("path has spaces".into()).is_fatal_for_repo());
        assert!(!ChurnError::ToolInvocation("exit code 1".into()).is_fatal_for_repo());
        assert!(!ChurnError::MalformedRow {
            file: "f".into(),
            line: 1,
            reason: "r".into()
        }
        .is_fatal_for_repo());
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = ChurnError::FileNotFound(PathBuf::from("/tmp/missing.csv"));
        assert!(err.to_string().contains("/tmp/missing.csv"));
    }
}
