//! Decoding one commit's raw analyzer output into metric snapshots.
//!
//! The analyzer writes a class-level and a method-level tabular file per
//! commit. Columns are located by header name, so extra columns and
//! column reordering across analyzer versions are harmless. A malformed
//! row is skipped and counted; it never poisons the rest of the file.

use std::path::Path;

use churnscope_core::table::split_row;
use churnscope_core::{
    ChurnError, ClassKind, EntityId, EntityMode, MetricSnapshot, MetricVector,
};

/// Snapshots decoded from one commit's analyzer output, plus how many
/// rows had to be skipped.
#[derive(Debug, Default)]
pub struct ParsedCommit {
    /// One snapshot per well-formed row.
    pub snapshots: Vec<MetricSnapshot>,
    /// Rows dropped as malformed.
    pub skipped_rows: usize,
}

/// Parse one commit's metrics file into snapshots.
///
/// A missing file yields an empty [`ParsedCommit`]: the analyzer failed
/// for that commit, which the traversal already logged.
///
/// # Errors
///
/// Returns [`ChurnError::MalformedRow`] pointing at line 1 if the header
/// lacks a required column; the whole file is unusable then. Individual
/// bad rows are counted in `skipped_rows` instead of erroring.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use churnscope_core::EntityMode;
/// use churnscope_evolve::parser::parse_metrics_file;
///
/// let parsed = parse_metrics_file(
///     Path::new("metrics/junit4/1-abc123de/class.csv"),
///     EntityMode::Class,
///     1,
///     "abc123de",
///     "src/",
/// )
/// .unwrap();
/// println!("{} snapshots", parsed.snapshots.len());
/// ```
pub fn parse_metrics_file(
    path: &Path,
    mode: EntityMode,
    commit_index: usize,
    commit_hash: &str,
    source_root_marker: &str,
) -> Result<ParsedCommit, ChurnError> {
    if !path.exists() {
        return Ok(ParsedCommit::default());
    }
    let content = std::fs::read_to_string(path)?;
    let file_name = path.display().to_string();

    let mut lines = content.lines();
    let Some(header) = lines.next() else {
        return Ok(ParsedCommit::default());
    };
    let columns = ColumnMap::from_header(header, mode)
        .map_err(|reason| ChurnError::MalformedRow {
            file: file_name.clone(),
            line: 1,
            reason,
        })?;

    let mut parsed = ParsedCommit::default();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        match columns.decode_row(line, mode, source_root_marker) {
            Some((entity, metrics)) => parsed.snapshots.push(MetricSnapshot {
                entity,
                commit_index,
                commit_hash: commit_hash.to_string(),
                metrics,
            }),
            None => parsed.skipped_rows += 1,
        }
    }
    Ok(parsed)
}

/// Column indices resolved from a header row.
struct ColumnMap {
    file: usize,
    class: usize,
    /// `type` column in class mode, `method` column in method mode.
    discriminator: usize,
    cbo: usize,
    cbo_modified: usize,
    wmc: usize,
    rfc: usize,
}

impl ColumnMap {
    fn from_header(header: &str, mode: EntityMode) -> Result<Self, String> {
        let names: Vec<String> = split_row(header)
            .iter()
            .map(|name| normalize(name))
            .collect();
        let find = |wanted: &str| -> Result<usize, String> {
            names
                .iter()
                .position(|n| n == wanted)
                .ok_or_else(|| format!("missing required column '{wanted}'"))
        };
        let discriminator = match mode {
            EntityMode::Class => find("type")?,
            EntityMode::Method => find("method")?,
        };
        Ok(Self {
            file: find("file")?,
            class: find("class")?,
            discriminator,
            cbo: find("cbo")?,
            cbo_modified: find("cbomodified")?,
            wmc: find("wmc")?,
            rfc: find("rfc")?,
        })
    }

    fn decode_row(
        &self,
        line: &str,
        mode: EntityMode,
        source_root_marker: &str,
    ) -> Option<(EntityId, MetricVector)> {
        let fields = split_row(line);
        let needed = [
            self.file,
            self.class,
            self.discriminator,
            self.cbo,
            self.cbo_modified,
            self.wmc,
            self.rfc,
        ];
        if needed.iter().any(|&i| i >= fields.len()) {
            return None;
        }

        let metrics = MetricVector {
            cbo: fields[self.cbo].trim().parse().ok()?,
            cbo_modified: fields[self.cbo_modified].trim().parse().ok()?,
            wmc: fields[self.wmc].trim().parse().ok()?,
            rfc: fields[self.rfc].trim().parse().ok()?,
        };

        let class_name = fields[self.class].trim();
        if class_name.is_empty() {
            return None;
        }

        let entity = match mode {
            EntityMode::Class => {
                let kind: ClassKind = fields[self.discriminator].parse().ok()?;
                let name = if class_name.contains('.') {
                    class_name.to_string()
                } else {
                    qualify_from_path(fields[self.file].trim(), source_root_marker)
                };
                EntityId::Class { name, kind }
            }
            EntityMode::Method => {
                let signature = fields[self.discriminator].trim();
                if signature.is_empty() {
                    return None;
                }
                EntityId::Method {
                    class: class_name.to_string(),
                    signature: signature.to_string(),
                }
            }
        };
        Some((entity, metrics))
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect::<String>()
        .to_lowercase()
}

/// Derive a package-qualified name from a source file path.
///
/// Strips everything up to and including the source-root marker, drops
/// the file extension, and turns path separators into dots. Used when
/// the analyzer reports an unqualified class name.
///
/// # Examples
///
/// ```
/// use churnscope_evolve::parser::qualify_from_path;
///
/// assert_eq!(
///     qualify_from_path("project/src/main/java/org/x/App.java", "src/main/java/"),
///     "org.x.App",
/// );
/// ```
pub fn qualify_from_path(file_path: &str, source_root_marker: &str) -> String {
    let path = file_path.replace('\\', "/");
    let tail = match path.rfind(source_root_marker) {
        Some(pos) => &path[pos + source_root_marker.len()..],
        None => path.as_str(),
    };
    let stem = match tail.rfind('.') {
        Some(pos) => &tail[..pos],
        None => tail,
    };
    stem.trim_matches('/').replace('/', ".")
}
