//! The change-evolution tracker.
//!
//! A single forward streaming pass over commits in strictly increasing
//! index order. Per entity it keeps only the accumulating timeline; the
//! comparison state is the timeline's last vector, so memory beyond the
//! timelines themselves is O(1) per entity.
//!
//! Dedup is consecutive-only by design: a vector that reverts to an
//! earlier value after an intermediate different value counts as a new
//! change. That is the churn semantics — "how often did this entity's
//! metrics move", not "how many distinct values were ever observed".

use std::collections::HashMap;

use churnscope_core::{ChurnError, EntityEvolution, EntityId, MetricSnapshot, TimelinePoint};

/// Builds per-entity deduplicated timelines across a whole commit range.
///
/// # Examples
///
/// ```
/// use churnscope_core::{ClassKind, EntityId, MetricSnapshot, MetricVector};
/// use churnscope_evolve::tracker::EvolutionTracker;
///
/// let entity = EntityId::Class { name: "org.A".into(), kind: ClassKind::Class };
/// let vector = MetricVector { cbo: 2.0, cbo_modified: 2.0, wmc: 5.0, rfc: 5.0 };
/// let snapshot = |i: usize| MetricSnapshot {
///     entity: entity.clone(),
///     commit_index: i,
///     commit_hash: format!("h{i}"),
///     metrics: vector,
/// };
///
/// let mut tracker = EvolutionTracker::new();
/// tracker.observe_commit(1, &[snapshot(1)]).unwrap();
/// tracker.observe_commit(2, &[snapshot(2)]).unwrap();
///
/// let evolutions = tracker.finish();
/// // The identical second observation was deduplicated.
/// assert_eq!(evolutions[0].change_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct EvolutionTracker {
    entities: HashMap<EntityId, EntityEvolution>,
    last_index: usize,
}

impl EvolutionTracker {
    /// An empty tracker; feed it commits with [`observe_commit`].
    ///
    /// [`observe_commit`]: EvolutionTracker::observe_commit
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one commit's snapshots into the timelines.
    ///
    /// For each entity: if it has no timeline yet or its last recorded
    /// vector differs from the snapshot's (exact 4-tuple equality), a
    /// timeline point is appended; otherwise nothing happens. Entities
    /// absent from this commit keep their last recorded vector.
    ///
    /// # Errors
    ///
    /// Returns [`ChurnError::Config`] if `commit_index` does not exceed
    /// the previously observed index; the streaming pass is only valid
    /// over a strictly increasing commit sequence.
    pub fn observe_commit(
        &mut self,
        commit_index: usize,
        snapshots: &[MetricSnapshot],
    ) -> Result<(), ChurnError> {
        if commit_index <= self.last_index {
            return Err(ChurnError::Config(format!(
                "commits must be observed in strictly increasing order: \
                 got index {commit_index} after {}",
                self.last_index
            )));
        }
        self.last_index = commit_index;

        for snapshot in snapshots {
            let evolution = self
                .entities
                .entry(snapshot.entity.clone())
                .or_insert_with(|| EntityEvolution {
                    entity: snapshot.entity.clone(),
                    timeline: Vec::new(),
                });
            let changed = match evolution.timeline.last() {
                Some(last) => last.metrics != snapshot.metrics,
                None => true,
            };
            if changed {
                evolution.timeline.push(TimelinePoint {
                    commit_index,
                    commit_hash: snapshot.commit_hash.clone(),
                    metrics: snapshot.metrics,
                });
            }
        }
        Ok(())
    }

    /// Number of entities observed so far.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Finalize into evolutions, sorted by entity for deterministic
    /// downstream iteration.
    pub fn finish(self) -> Vec<EntityEvolution> {
        let mut evolutions: Vec<EntityEvolution> = self.entities.into_values().collect();
        evolutions.sort_by(|a, b| a.entity.cmp(&b.entity));
        evolutions
    }
}
