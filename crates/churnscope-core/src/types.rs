use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The four design metrics tracked for every entity at every commit.
///
/// Equality is exact over the 4-tuple: two vectors are the same only if
/// all four values compare equal, which is what the evolution tracker
/// uses to decide whether an entity "changed".
///
/// # Examples
///
/// ```
/// use churnscope_core::MetricVector;
///
/// let a = MetricVector { cbo: 2.0, cbo_modified: 2.0, wmc: 5.0, rfc: 5.0 };
/// let b = MetricVector { cbo: 2.0, cbo_modified: 2.0, wmc: 5.0, rfc: 5.0 };
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricVector {
    /// Coupling Between Objects.
    pub cbo: f64,
    /// Modified variant of CBO.
    pub cbo_modified: f64,
    /// Weighted Methods per Class.
    pub wmc: f64,
    /// Response For a Class.
    pub rfc: f64,
}

impl MetricVector {
    /// The metric values in output-column order (CBO, CBOModified, WMC, RFC).
    pub fn as_array(&self) -> [f64; 4] {
        [self.cbo, self.cbo_modified, self.wmc, self.rfc]
    }
}

/// Kind of class-like declaration reported by the analyzer.
///
/// # Examples
///
/// ```
/// use churnscope_core::ClassKind;
///
/// let kind: ClassKind = "innerclass".parse().unwrap();
/// assert_eq!(kind, ClassKind::Inner);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    /// Top-level class.
    Class,
    /// Interface declaration.
    Interface,
    /// Enum declaration.
    Enum,
    /// Named inner class.
    Inner,
    /// Anonymous class.
    Anonymous,
}

impl fmt::Display for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ClassKind::Class => "class",
            ClassKind::Interface => "interface",
            ClassKind::Enum => "enum",
            ClassKind::Inner => "innerclass",
            ClassKind::Anonymous => "anonymous",
        };
        write!(f, "{label}")
    }
}

impl FromStr for ClassKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "class" => Ok(ClassKind::Class),
            "interface" => Ok(ClassKind::Interface),
            "enum" => Ok(ClassKind::Enum),
            "innerclass" | "inner" => Ok(ClassKind::Inner),
            "anonymous" => Ok(ClassKind::Anonymous),
            other => Err(format!("unknown class kind: {other}")),
        }
    }
}

/// Identity of a tracked design entity.
///
/// In class mode an entity is a qualified class name plus its kind; two
/// declarations with the same name but different kinds (e.g. a class and
/// an inner class) are distinct entities. In method mode it is a method
/// signature (including overload arity, as emitted by the analyzer) plus
/// its owning class.
///
/// The derived ordering is lexicographic and serves as the deterministic
/// tie-break when ranking entities with equal change counts.
///
/// # Examples
///
/// ```
/// use churnscope_core::{ClassKind, EntityId};
///
/// let id = EntityId::Class {
///     name: "org.example.Engine".into(),
///     kind: ClassKind::Class,
/// };
/// assert_eq!(id.to_string(), "org.example.Engine");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityId {
    /// A class-like declaration.
    Class {
        /// Package-qualified name.
        name: String,
        /// Declaration kind.
        kind: ClassKind,
    },
    /// A method, keyed by its overload-disambiguated signature.
    Method {
        /// Qualified name of the owning class.
        class: String,
        /// Signature as emitted by the analyzer, e.g. `run/2[int,String]`.
        signature: String,
    },
}

impl EntityId {
    /// The name written in the first output column: the qualified class
    /// name, or `class#signature` for methods.
    pub fn label(&self) -> String {
        match self {
            EntityId::Class { name, .. } => name.clone(),
            EntityId::Method { class, signature } => format!("{class}#{signature}"),
        }
    }

    /// The second output column: class kind, or the bare signature.
    pub fn discriminator(&self) -> String {
        match self {
            EntityId::Class { kind, .. } => kind.to_string(),
            EntityId::Method { signature, .. } => signature.clone(),
        }
    }

    /// A filesystem-safe stem for per-entity output files.
    ///
    /// Anything outside `[A-Za-z0-9._-]` becomes `_`, so signatures with
    /// brackets or slashes produce valid file names on all platforms.
    ///
    /// # Examples
    ///
    /// ```
    /// use churnscope_core::EntityId;
    ///
    /// let id = EntityId::Method {
    ///     class: "org.example.Engine".into(),
    ///     signature: "run/2[int,java.lang.String]".into(),
    /// };
    /// assert_eq!(
    ///     id.file_stem(),
    ///     "org.example.Engine_run_2_int_java.lang.String_",
    /// );
    /// ```
    pub fn file_stem(&self) -> String {
        let raw = match self {
            EntityId::Class { name, kind } => format!("{name}_{kind}"),
            EntityId::Method { class, signature } => format!("{class}_{signature}"),
        };
        raw.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Whether the pipeline tracks classes or methods.
///
/// # Examples
///
/// ```
/// use churnscope_core::EntityMode;
///
/// let mode: EntityMode = "method".parse().unwrap();
/// assert_eq!(mode, EntityMode::Method);
/// assert_eq!(EntityMode::default(), EntityMode::Class);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityMode {
    /// Track class-level metrics from the analyzer's class file.
    #[default]
    Class,
    /// Track method-level metrics from the analyzer's method file.
    Method,
}

impl EntityMode {
    /// Header label for the first column of output files.
    pub fn column_label(&self) -> &'static str {
        match self {
            EntityMode::Class => "Class",
            EntityMode::Method => "Method",
        }
    }

    /// Header label for the discriminator column of the statistics file.
    pub fn discriminator_label(&self) -> &'static str {
        match self {
            EntityMode::Class => "Type",
            EntityMode::Method => "Method",
        }
    }
}

impl fmt::Display for EntityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityMode::Class => write!(f, "class"),
            EntityMode::Method => write!(f, "method"),
        }
    }
}

impl FromStr for EntityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "class" => Ok(EntityMode::Class),
            "method" => Ok(EntityMode::Method),
            other => Err(format!("unknown entity mode: {other}")),
        }
    }
}

/// The first eight characters of a commit hash, used in artifact
/// directory names.
///
/// # Examples
///
/// ```
/// use churnscope_core::short_hash;
///
/// assert_eq!(short_hash("deadbeefcafe0123"), "deadbeef");
/// assert_eq!(short_hash("abc"), "abc");
/// ```
pub fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(8)]
}

/// Name of the commit-hash list exported into `metrics/{repo}/` when a
/// traversal completes. Its presence is the completeness witness the
/// evolution stage checks before building timelines.
pub const COMMIT_LIST_FILE: &str = "commits.csv";

/// Header of the commit-hash list.
pub const COMMIT_LIST_HEADER: &str = "Commit Hash,Commit Message,Commit Date";

/// Directory name for one commit's artifacts: `{index}-{shorthash}`.
///
/// Shared between the mining stage (which writes diff and metrics
/// directories) and the evolution stage (which reads them back).
///
/// # Examples
///
/// ```
/// use churnscope_core::commit_dir_name;
///
/// assert_eq!(commit_dir_name(12, "deadbeefcafe0123"), "12-deadbeef");
/// ```
pub fn commit_dir_name(index: usize, hash: &str) -> String {
    format!("{index}-{}", short_hash(hash))
}

/// One commit in traversal order.
///
/// Indices are 1-based positions in the oldest-first walk, contiguous and
/// strictly increasing within a repository. They are traversal positions,
/// not anything derived from hashes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitMeta {
    /// 1-based position in the traversal.
    pub index: usize,
    /// Full commit hash.
    pub hash: String,
    /// First line of the commit message.
    pub message: String,
    /// Unix timestamp of the commit.
    pub timestamp: i64,
    /// Paths modified by this commit, relative to the repo root.
    pub modified_files: Vec<String>,
}

/// One entity's metric reading at one commit.
///
/// Produced by the snapshot parser and consumed immediately by the
/// evolution tracker; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    /// The entity this reading belongs to.
    pub entity: EntityId,
    /// Traversal index of the commit.
    pub commit_index: usize,
    /// Hash of the commit.
    pub commit_hash: String,
    /// The metric reading.
    pub metrics: MetricVector,
}

/// One entry in an entity's deduplicated timeline: the commit at which a
/// distinct metric vector first appeared.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelinePoint {
    /// Traversal index of the commit that introduced this vector.
    pub commit_index: usize,
    /// Hash of that commit.
    pub commit_hash: String,
    /// The vector itself.
    pub metrics: MetricVector,
}

/// An entity's full change history across the mined commit range.
///
/// The timeline holds only distinct consecutive vectors, in traversal
/// order; its length *is* the entity's change count.
///
/// # Examples
///
/// ```
/// use churnscope_core::{ClassKind, EntityEvolution, EntityId, MetricVector, TimelinePoint};
///
/// let evo = EntityEvolution {
///     entity: EntityId::Class { name: "A".into(), kind: ClassKind::Class },
///     timeline: vec![TimelinePoint {
///         commit_index: 3,
///         commit_hash: "abc".into(),
///         metrics: MetricVector { cbo: 1.0, cbo_modified: 1.0, wmc: 1.0, rfc: 1.0 },
///     }],
/// };
/// assert_eq!(evo.change_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct EntityEvolution {
    /// Who this timeline belongs to.
    pub entity: EntityId,
    /// Distinct consecutive metric vectors in traversal order.
    pub timeline: Vec<TimelinePoint>,
}

impl EntityEvolution {
    /// Number of behavioral changes: the timeline length by construction.
    pub fn change_count(&self) -> usize {
        self.timeline.len()
    }

    /// Hash of the commit where the entity was first observed.
    pub fn first_commit_hash(&self) -> Option<&str> {
        self.timeline.first().map(|p| p.commit_hash.as_str())
    }

    /// Hash of the commit that introduced the latest distinct vector.
    pub fn last_commit_hash(&self) -> Option<&str> {
        self.timeline.last().map(|p| p.commit_hash.as_str())
    }
}
