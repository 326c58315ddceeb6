//! Aggregation of entity timelines into ranked statistics files.
//!
//! Produces the two report shapes downstream analysis consumes: one
//! CSV per entity holding its full metric timeline, and a single
//! statistics file ranking every entity by how often it changed.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use churnscope_core::table::format_row;
use churnscope_core::{EntityEvolution, EntityId, EntityMode, MetricVector, Result};

/// File name of the unsorted intermediate statistics table.
pub const STATISTICS_FILE: &str = "statistics.csv";
/// File name of the final, ranked statistics table.
pub const STATISTICS_SORTED_FILE: &str = "statistics-sorted.csv";
/// Directory under a repo's results holding per-entity timeline files.
pub const EVOLUTIONS_DIR: &str = "evolutions";

/// Distribution summary of one metric over an entity's distinct vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// 75th percentile, linearly interpolated between closest ranks.
    pub q3: f64,
}

impl MetricSummary {
    /// Summarize a non-empty sample.
    ///
    /// Returns `None` for an empty slice; an entity with no timeline
    /// has nothing to summarize and is excluded upstream.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let min = sorted[0];
        let max = sorted[sorted.len() - 1];
        let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
        Some(Self {
            min,
            max,
            mean,
            q3: percentile(&sorted, 0.75),
        })
    }
}

/// Percentile of a sorted sample, interpolating linearly between the
/// two closest ranks. `q` is in `[0, 1]`.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = q * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

/// One row of the statistics table.
#[derive(Debug, Clone)]
pub struct EntityStats {
    pub entity: EntityId,
    pub changed: usize,
    pub cbo: MetricSummary,
    pub cbo_modified: MetricSummary,
    pub wmc: MetricSummary,
    pub rfc: MetricSummary,
    pub first_commit_hash: String,
    pub last_commit_hash: String,
}

impl EntityStats {
    /// Aggregate one entity's evolution, or `None` for an empty
    /// timeline.
    ///
    /// Aggregates run over the *distinct* metric vectors of the
    /// timeline. A timeline can revisit a vector it held before an
    /// intermediate change; that revisit counts as churn but not as a
    /// new sample point.
    pub fn from_evolution(evolution: &EntityEvolution) -> Option<Self> {
        let observed: Vec<MetricVector> = evolution.timeline.iter().map(|p| p.metrics).collect();
        let vectors = distinct_vectors(&observed);
        let column = |pick: fn(&MetricVector) -> f64| -> Vec<f64> {
            vectors.iter().map(pick).collect()
        };
        Some(Self {
            entity: evolution.entity.clone(),
            changed: evolution.change_count(),
            cbo: MetricSummary::from_values(&column(|v| v.cbo))?,
            cbo_modified: MetricSummary::from_values(&column(|v| v.cbo_modified))?,
            wmc: MetricSummary::from_values(&column(|v| v.wmc))?,
            rfc: MetricSummary::from_values(&column(|v| v.rfc))?,
            first_commit_hash: evolution.first_commit_hash()?.to_string(),
            last_commit_hash: evolution.last_commit_hash()?.to_string(),
        })
    }
}

/// Unique vectors in first-observation order.
fn distinct_vectors(vectors: &[MetricVector]) -> Vec<MetricVector> {
    let mut seen: Vec<MetricVector> = Vec::with_capacity(vectors.len());
    for v in vectors {
        if !seen.contains(v) {
            seen.push(*v);
        }
    }
    seen
}

/// Header row of the statistics table for the given entity mode.
pub fn statistics_header(mode: EntityMode) -> String {
    let mut columns = vec![
        mode.column_label().to_string(),
        mode.discriminator_label().to_string(),
        "Changed".to_string(),
    ];
    for metric in ["CBO", "CBOModified", "WMC", "RFC"] {
        for stat in ["Min", "Max", "Avg", "Q3"] {
            columns.push(format!("{metric} {stat}"));
        }
    }
    columns.push("First Commit Hash".to_string());
    columns.push("Last Commit Hash".to_string());
    format_row(&columns)
}

/// Header row of a per-entity evolution file.
pub fn evolution_header(mode: EntityMode) -> String {
    format_row(&[
        mode.column_label(),
        "Commit Hash",
        "CBO",
        "CBO Modified",
        "WMC",
        "RFC",
    ])
}

fn fmt_metric(value: f64) -> String {
    // `{}` on f64 renders whole numbers without a trailing ".0".
    format!("{value}")
}

fn stats_row(stats: &EntityStats) -> String {
    let mut fields = vec![
        stats.entity.label(),
        stats.entity.discriminator(),
        stats.changed.to_string(),
    ];
    for summary in [&stats.cbo, &stats.cbo_modified, &stats.wmc, &stats.rfc] {
        fields.push(fmt_metric(summary.min));
        fields.push(fmt_metric(summary.max));
        fields.push(fmt_metric(summary.mean));
        fields.push(fmt_metric(summary.q3));
    }
    fields.push(stats.first_commit_hash.clone());
    fields.push(stats.last_commit_hash.clone());
    format_row(&fields)
}

/// Aggregate evolutions into statistics rows, dropping entities that
/// changed fewer than `min_changes` times.
pub fn compute_stats(evolutions: &[EntityEvolution], min_changes: usize) -> Vec<EntityStats> {
    evolutions
        .iter()
        .filter(|e| e.change_count() >= min_changes)
        .filter_map(EntityStats::from_evolution)
        .collect()
}

/// Write the ranked statistics table under `out_dir`.
///
/// The table is first written in entity order as [`STATISTICS_FILE`],
/// then rewritten as [`STATISTICS_SORTED_FILE`] ordered by `Changed`
/// descending with entity identity as the tie-break; the unsorted
/// intermediate is removed once the sorted file is on disk. Returns
/// the path of the sorted file.
pub fn write_statistics(
    out_dir: &Path,
    mode: EntityMode,
    stats: &[EntityStats],
) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)?;
    let unsorted_path = out_dir.join(STATISTICS_FILE);
    write_table(&unsorted_path, mode, stats)?;

    let mut ranked: Vec<&EntityStats> = stats.iter().collect();
    ranked.sort_by(|a, b| {
        b.changed
            .cmp(&a.changed)
            .then_with(|| a.entity.cmp(&b.entity))
    });

    let sorted_path = out_dir.join(STATISTICS_SORTED_FILE);
    {
        let mut out = std::io::BufWriter::new(fs::File::create(&sorted_path)?);
        writeln!(out, "{}", statistics_header(mode))?;
        for row in &ranked {
            writeln!(out, "{}", stats_row(row))?;
        }
        out.flush()?;
    }
    fs::remove_file(&unsorted_path)?;
    Ok(sorted_path)
}

fn write_table(path: &Path, mode: EntityMode, stats: &[EntityStats]) -> Result<()> {
    let mut out = std::io::BufWriter::new(fs::File::create(path)?);
    writeln!(out, "{}", statistics_header(mode))?;
    for row in stats {
        writeln!(out, "{}", stats_row(row))?;
    }
    out.flush()?;
    Ok(())
}

/// Write one timeline file per evolution under `out_dir/evolutions/`.
///
/// File names come from [`EntityId::file_stem`], so method overloads
/// land in distinct files. Returns the number of files written.
pub fn write_evolutions(
    out_dir: &Path,
    mode: EntityMode,
    evolutions: &[EntityEvolution],
) -> Result<usize> {
    let dir = out_dir.join(EVOLUTIONS_DIR);
    fs::create_dir_all(&dir)?;
    for evolution in evolutions {
        let path = dir.join(format!("{}.csv", evolution.entity.file_stem()));
        let mut out = std::io::BufWriter::new(fs::File::create(&path)?);
        writeln!(out, "{}", evolution_header(mode))?;
        for point in &evolution.timeline {
            writeln!(
                out,
                "{}",
                format_row(&[
                    evolution.entity.label(),
                    point.commit_hash.clone(),
                    fmt_metric(point.metrics.cbo),
                    fmt_metric(point.metrics.cbo_modified),
                    fmt_metric(point.metrics.wmc),
                    fmt_metric(point.metrics.rfc),
                ])
            )?;
        }
        out.flush()?;
    }
    Ok(evolutions.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use churnscope_core::{ClassKind, TimelinePoint};

    fn vector(cbo: f64, wmc: f64) -> MetricVector {
        MetricVector {
            cbo,
            cbo_modified: cbo,
            wmc,
            rfc: wmc,
        }
    }

    fn evolution(name: &str, points: &[(usize, f64, f64)]) -> EntityEvolution {
        EntityEvolution {
            entity: EntityId::Class {
                name: name.into(),
                kind: ClassKind::Class,
            },
            timeline: points
                .iter()
                .map(|(i, cbo, wmc)| TimelinePoint {
                    commit_index: *i,
                    commit_hash: format!("hash{i}"),
                    metrics: vector(*cbo, *wmc),
                })
                .collect(),
        }
    }

    #[test]
    fn summary_of_single_value() {
        let s = MetricSummary::from_values(&[4.0]).unwrap();
        assert_eq!(s.min, 4.0);
        assert_eq!(s.max, 4.0);
        assert_eq!(s.mean, 4.0);
        assert_eq!(s.q3, 4.0);
    }

    #[test]
    fn summary_of_empty_sample_is_none() {
        assert!(MetricSummary::from_values(&[]).is_none());
    }

    #[test]
    fn q3_interpolates_between_ranks() {
        // Ranks 0..3, q3 rank = 2.25: 3 + 0.25 * (10 - 3) = 4.75.
        let s = MetricSummary::from_values(&[1.0, 2.0, 3.0, 10.0]).unwrap();
        assert!((s.q3 - 4.75).abs() < 1e-9);
        assert_eq!(s.mean, 4.0);
    }

    #[test]
    fn q3_lands_exactly_on_a_rank_for_five_values() {
        // q3 rank = 0.75 * 4 = 3, exactly the fourth sorted value.
        let s = MetricSummary::from_values(&[5.0, 1.0, 3.0, 2.0, 4.0]).unwrap();
        assert_eq!(s.q3, 4.0);
    }

    #[test]
    fn summary_is_order_independent() {
        let a = MetricSummary::from_values(&[3.0, 1.0, 4.0, 1.5, 9.0]).unwrap();
        let b = MetricSummary::from_values(&[9.0, 1.5, 1.0, 4.0, 3.0]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn revisited_vectors_count_once_in_aggregates() {
        // cbo goes 2 -> 9 -> 2: three changes, two distinct samples.
        let evo = evolution("org.A", &[(1, 2.0, 5.0), (2, 9.0, 5.0), (3, 2.0, 5.0)]);
        let stats = EntityStats::from_evolution(&evo).unwrap();
        assert_eq!(stats.changed, 3);
        assert_eq!(stats.cbo.min, 2.0);
        assert_eq!(stats.cbo.max, 9.0);
        assert_eq!(stats.cbo.mean, 5.5);
        assert_eq!(stats.first_commit_hash, "hash1");
        assert_eq!(stats.last_commit_hash, "hash3");
    }

    #[test]
    fn min_changes_filters_rows() {
        let evolutions = vec![
            evolution("org.Busy", &[(1, 1.0, 1.0), (2, 2.0, 1.0), (3, 3.0, 1.0)]),
            evolution("org.Quiet", &[(1, 1.0, 1.0)]),
        ];
        let stats = compute_stats(&evolutions, 2);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].entity.label(), "org.Busy");
    }

    #[test]
    fn header_matches_mode() {
        let class = statistics_header(EntityMode::Class);
        assert!(class.starts_with("Class,Type,Changed,CBO Min,"));
        assert!(class.ends_with("First Commit Hash,Last Commit Hash"));
        let method = statistics_header(EntityMode::Method);
        assert!(method.starts_with("Method,Method,Changed,"));
    }

    #[test]
    fn sorted_file_ranks_by_changes_with_stable_ties() {
        let dir = tempfile::tempdir().unwrap();
        let evolutions = vec![
            evolution("org.B", &[(1, 1.0, 1.0), (2, 2.0, 1.0)]),
            evolution("org.A", &[(1, 1.0, 1.0), (2, 2.0, 1.0)]),
            evolution("org.C", &[(1, 1.0, 1.0), (2, 2.0, 1.0), (3, 3.0, 1.0)]),
        ];
        let stats = compute_stats(&evolutions, 1);
        let path = write_statistics(dir.path(), EntityMode::Class, &stats).unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let names: Vec<&str> = body
            .lines()
            .skip(1)
            .map(|l| l.split(',').next().unwrap())
            .collect();
        assert_eq!(names, vec!["org.C", "org.A", "org.B"]);
        // The unsorted intermediate is gone.
        assert!(!dir.path().join(STATISTICS_FILE).exists());
    }

    #[test]
    fn ranking_is_permutation_invariant() {
        let base = vec![
            evolution("org.A", &[(1, 1.0, 1.0), (3, 2.0, 1.0)]),
            evolution("org.B", &[(2, 1.0, 1.0)]),
            evolution("org.C", &[(1, 1.0, 1.0), (2, 2.0, 1.0), (4, 3.0, 1.0)]),
        ];
        let mut shuffled = base.clone();
        shuffled.reverse();

        let render = |evolutions: &[EntityEvolution]| {
            let dir = tempfile::tempdir().unwrap();
            let stats = compute_stats(evolutions, 1);
            let path = write_statistics(dir.path(), EntityMode::Class, &stats).unwrap();
            std::fs::read_to_string(path).unwrap()
        };
        assert_eq!(render(&base), render(&shuffled));
    }

    #[test]
    fn evolution_files_hold_full_timelines() {
        let dir = tempfile::tempdir().unwrap();
        let evolutions = vec![evolution("org.A", &[(1, 2.0, 5.0), (4, 3.0, 6.0)])];
        let written = write_evolutions(dir.path(), EntityMode::Class, &evolutions).unwrap();
        assert_eq!(written, 1);

        let path = dir.path().join(EVOLUTIONS_DIR).join("org.A_class.csv");
        let body = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], "Class,Commit Hash,CBO,CBO Modified,WMC,RFC");
        assert_eq!(lines[1], "org.A,hash1,2,2,5,5");
        assert_eq!(lines[2], "org.A,hash4,3,3,6,6");
    }
}
