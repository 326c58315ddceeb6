use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ChurnError;
use crate::types::EntityMode;

/// Top-level configuration loaded from `.churnscope.toml`.
///
/// Every component receives the slice of configuration it needs at
/// construction; nothing reads global mutable state.
///
/// # Examples
///
/// ```
/// use churnscope_core::ChurnConfig;
///
/// let config = ChurnConfig::default();
/// assert_eq!(config.mining.max_workers, 4);
/// assert_eq!(config.evolution.min_changes, 2);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChurnConfig {
    /// Repositories to mine.
    #[serde(default)]
    pub repos: Vec<RepoSpec>,
    /// Output and working directory layout.
    #[serde(default)]
    pub paths: PathsConfig,
    /// External metrics analyzer settings.
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    /// Traversal and concurrency settings.
    #[serde(default)]
    pub mining: MiningConfig,
    /// Timeline and statistics settings.
    #[serde(default)]
    pub evolution: EvolutionConfig,
}

impl ChurnConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ChurnError::Io`] if the file cannot be read, or
    /// [`ChurnError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use churnscope_core::ChurnConfig;
    /// use std::path::Path;
    ///
    /// let config = ChurnConfig::from_file(Path::new(".churnscope.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, ChurnError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ChurnError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use churnscope_core::ChurnConfig;
    ///
    /// let toml = r#"
    /// [mining]
    /// max_workers = 2
    /// "#;
    /// let config = ChurnConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.mining.max_workers, 2);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, ChurnError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Look up a configured repository by name.
    pub fn repo(&self, name: &str) -> Option<&RepoSpec> {
        self.repos.iter().find(|r| r.name == name)
    }
}

/// One repository to mine.
///
/// # Examples
///
/// ```
/// use churnscope_core::RepoSpec;
///
/// let spec = RepoSpec {
///     name: "commons-lang".into(),
///     url: "https://github.com/apache/commons-lang.git".into(),
///     path: None,
///     commits: Some(7200),
/// };
/// assert!(spec.path.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSpec {
    /// Short name; used in every output path.
    pub name: String,
    /// Remote URL to clone from when no local copy exists.
    pub url: String,
    /// Override for the local working-copy path (default:
    /// `{paths.repos_dir}/{name}`).
    pub path: Option<PathBuf>,
    /// Known total commit count, used only for the up-front time
    /// estimate printed before the repository starts.
    pub commits: Option<usize>,
}

impl RepoSpec {
    /// Resolve the working-copy path for this repository.
    pub fn local_path(&self, repos_dir: &Path) -> PathBuf {
        match &self.path {
            Some(p) => p.clone(),
            None => repos_dir.join(&self.name),
        }
    }
}

/// Directory layout for working copies and pipeline outputs.
///
/// # Examples
///
/// ```
/// use churnscope_core::PathsConfig;
///
/// let paths = PathsConfig::default();
/// assert_eq!(paths.diffs_dir.to_str(), Some("diffs"));
/// assert_eq!(paths.metrics_dir.to_str(), Some("metrics"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where working copies are cloned (default: `repos`).
    #[serde(default = "default_repos_dir")]
    pub repos_dir: PathBuf,
    /// Per-commit diff artifacts (default: `diffs`).
    #[serde(default = "default_diffs_dir")]
    pub diffs_dir: PathBuf,
    /// Per-commit analyzer output (default: `metrics`).
    #[serde(default = "default_metrics_dir")]
    pub metrics_dir: PathBuf,
    /// Traversal checkpoints (default: `checkpoints`).
    #[serde(default = "default_checkpoints_dir")]
    pub checkpoints_dir: PathBuf,
    /// Evolution and statistics output (default: `results`).
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

fn default_repos_dir() -> PathBuf {
    PathBuf::from("repos")
}

fn default_diffs_dir() -> PathBuf {
    PathBuf::from("diffs")
}

fn default_metrics_dir() -> PathBuf {
    PathBuf::from("metrics")
}

fn default_checkpoints_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            repos_dir: default_repos_dir(),
            diffs_dir: default_diffs_dir(),
            metrics_dir: default_metrics_dir(),
            checkpoints_dir: default_checkpoints_dir(),
            results_dir: default_results_dir(),
        }
    }
}

/// External metrics analyzer invocation settings.
///
/// The analyzer is run as `<binary> <worktree> <flags...> <output-dir>` and
/// is expected to produce a class-level and a method-level tabular file in
/// the output directory.
///
/// # Examples
///
/// ```
/// use churnscope_core::AnalyzerConfig;
///
/// let config = AnalyzerConfig::default();
/// assert_eq!(config.class_file, "class.csv");
/// assert_eq!(config.method_file, "method.csv");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Analyzer executable (default: `ck`).
    #[serde(default = "default_analyzer_binary")]
    pub binary: PathBuf,
    /// Flags inserted between the worktree and output-dir arguments.
    #[serde(default = "default_analyzer_flags")]
    pub flags: Vec<String>,
    /// Name of the class-level output file (default: `class.csv`).
    #[serde(default = "default_class_file")]
    pub class_file: String,
    /// Name of the method-level output file (default: `method.csv`).
    #[serde(default = "default_method_file")]
    pub method_file: String,
}

fn default_analyzer_binary() -> PathBuf {
    PathBuf::from("ck")
}

fn default_analyzer_flags() -> Vec<String> {
    // use-jars=false, auto partitioning, no field-level metrics
    vec!["false".into(), "0".into(), "false".into()]
}

fn default_class_file() -> String {
    "class.csv".into()
}

fn default_method_file() -> String {
    "method.csv".into()
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            binary: default_analyzer_binary(),
            flags: default_analyzer_flags(),
            class_file: default_class_file(),
            method_file: default_method_file(),
        }
    }
}

/// Traversal and concurrency settings.
///
/// # Examples
///
/// ```
/// use churnscope_core::MiningConfig;
///
/// let config = MiningConfig::default();
/// assert_eq!(config.max_workers, 4);
/// assert!(config.seconds_per_commit > 0.0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningConfig {
    /// Upper bound on concurrently mined repositories (default: 4).
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Historical per-commit duration used for up-front time estimates,
    /// in seconds (default: 14.0).
    #[serde(default = "default_seconds_per_commit")]
    pub seconds_per_commit: f64,
}

fn default_max_workers() -> usize {
    4
}

fn default_seconds_per_commit() -> f64 {
    14.0
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            seconds_per_commit: default_seconds_per_commit(),
        }
    }
}

/// Timeline and statistics settings.
///
/// # Examples
///
/// ```
/// use churnscope_core::{EntityMode, EvolutionConfig};
///
/// let config = EvolutionConfig::default();
/// assert_eq!(config.mode, EntityMode::Class);
/// assert_eq!(config.source_root_marker, "src/");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Track classes or methods (default: class).
    #[serde(default)]
    pub mode: EntityMode,
    /// Minimum change count for an entity to appear in statistics
    /// (default: 2).
    #[serde(default = "default_min_changes")]
    pub min_changes: usize,
    /// Path marker separating build layout from package layout; used to
    /// derive a package-qualified name when the analyzer reports an
    /// unqualified one (default: `src/`).
    #[serde(default = "default_source_root_marker")]
    pub source_root_marker: String,
}

fn default_min_changes() -> usize {
    2
}

fn default_source_root_marker() -> String {
    "src/".into()
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            mode: EntityMode::default(),
            min_changes: default_min_changes(),
            source_root_marker: default_source_root_marker(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = ChurnConfig::default();
        assert!(config.repos.is_empty());
        assert_eq!(config.paths.repos_dir, PathBuf::from("repos"));
        assert_eq!(config.paths.checkpoints_dir, PathBuf::from("checkpoints"));
        assert_eq!(config.analyzer.binary, PathBuf::from("ck"));
        assert_eq!(config.analyzer.flags, vec!["false", "0", "false"]);
        assert_eq!(config.mining.max_workers, 4);
        assert_eq!(config.evolution.mode, EntityMode::Class);
        assert_eq!(config.evolution.min_changes, 2);
    }

    #[test]
    fn parse_minimal_toml() {
        let toml = r#"
[[repos]]
name = "commons-io"
url = "https://github.com/apache/commons-io.git"

[evolution]
min_changes = 5
"#;
        let config = ChurnConfig::from_toml(toml).unwrap();
        assert_eq!(config.repos.len(), 1);
        assert_eq!(config.repos[0].name, "commons-io");
        assert_eq!(config.evolution.min_changes, 5);
        // Untouched sections keep defaults
        assert_eq!(config.mining.max_workers, 4);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[[repos]]
name = "junit4"
url = "https://github.com/junit-team/junit4.git"
path = "/data/junit4"

[paths]
repos_dir = "/data/repos"
results_dir = "/data/results"

[analyzer]
binary = "/opt/ck/ck"
flags = ["true", "100", "false"]

[mining]
max_workers = 8
seconds_per_commit = 30.0

[evolution]
mode = "method"
min_changes = 3
source_root_marker = "src/main/java/"
"#;
        let config = ChurnConfig::from_toml(toml).unwrap();
        assert_eq!(
            config.repos[0].path.as_deref(),
            Some(Path::new("/data/junit4"))
        );
        assert_eq!(config.paths.repos_dir, PathBuf::from("/data/repos"));
        assert_eq!(config.analyzer.flags, vec!["true", "100", "false"]);
        assert_eq!(config.mining.max_workers, 8);
        assert_eq!(config.evolution.mode, EntityMode::Method);
        assert_eq!(config.evolution.source_root_marker, "src/main/java/");
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = ChurnConfig::from_toml("").unwrap();
        assert_eq!(config.evolution.min_changes, 2);
        assert_eq!(config.analyzer.class_file, "class.csv");
    }

    #[test]
    fn invalid_toml_returns_error() {
        assert!(ChurnConfig::from_toml("{{invalid}}").is_err());
    }

    #[test]
    fn local_path_prefers_override() {
        let spec = RepoSpec {
            name: "x".into(),
            url: "u".into(),
            path: Some(PathBuf::from("/elsewhere/x")),
            commits: None,
        };
        assert_eq!(
            spec.local_path(Path::new("repos")),
            PathBuf::from("/elsewhere/x")
        );

        let spec = RepoSpec {
            name: "x".into(),
            url: "u".into(),
            path: None,
            commits: None,
        };
        assert_eq!(spec.local_path(Path::new("repos")), PathBuf::from("repos/x"));
    }

    #[test]
    fn repo_lookup_by_name() {
        let toml = r#"
[[repos]]
name = "a"
url = "ua"

[[repos]]
name = "b"
url = "ub"
"#;
        let config = ChurnConfig::from_toml(toml).unwrap();
        assert_eq!(config.repo("b").unwrap().url, "ub");
        assert!(config.repo("c").is_none());
    }
}
