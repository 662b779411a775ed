//! Stage A: the aggregate gate.
//!
//! One synchronous pass over the dataset using only cheap predicates. It
//! applies the hard constraints it can check cheaply and attaches an
//! optimistic upper bound to every surviving item, so Stage B can walk
//! candidates best-first and stop early.
//!
//! ## Algorithm
//! 1. Evaluate every cheap predicate to a bitmap (in parallel)
//! 2. For each non-excluded item:
//!    a. Any cheap MustNotHave match drops the item (OR)
//!    b. Count cheap MustHave matches; all matched makes a strict
//!       candidate, exactly one missed makes a near-miss
//!    c. Collect cheap Priority/Preferred values
//!    d. Upper bound = model score with every heavy predicate assumed matched
//! 3. Sort descending by upper bound and cap at `max_candidates`

use data_loader::ItemId;
use predicates::{
    EvalContext, Importance, MembershipBitmap, Partition, ResolvedPredicate, ScoringModelKind,
    TierCounts,
};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, instrument};

use crate::traits::{CategoryValues, ScoringModel};

/// An item that passed (or nearly passed) Stage A.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub item: ItemId,
    /// Score the item can reach if every heavy predicate goes its way
    pub upper_bound: f32,
    /// Cheap predicate hard matches per tier
    pub matches: TierCounts,
    /// Missed exactly one cheap MustHave predicate
    pub near_miss: bool,
    /// Category values from cheap predicates only
    pub cheap: CategoryValues,
}

/// Best-first order: higher bound first, lower item index on ties.
pub fn by_upper_bound(a: &Candidate, b: &Candidate) -> Ordering {
    b.upper_bound
        .total_cmp(&a.upper_bound)
        .then_with(|| a.item.cmp(&b.item))
}

/// Result of one gate pass.
#[derive(Debug, Clone, Default)]
pub struct GateOutput {
    /// Strict candidates, sorted descending by upper bound
    pub candidates: Vec<Candidate>,
    /// Items missing exactly one cheap MustHave, same order; never scored
    pub near_misses: Vec<Candidate>,
    /// Items evaluated (not excluded by the data source)
    pub scanned: usize,
    /// Strict candidates dropped by the cap
    pub truncated: usize,
}

impl GateOutput {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Cheap bitmaps split by importance tier.
struct TierBitmaps<'p> {
    must_have: Vec<(&'p ResolvedPredicate, MembershipBitmap)>,
    must_not_have: Vec<MembershipBitmap>,
    priority: Vec<(&'p ResolvedPredicate, MembershipBitmap)>,
    preferred: Vec<(&'p ResolvedPredicate, MembershipBitmap)>,
}

/// Stage A over one configuration snapshot.
pub struct AggregateGate<'a> {
    partition: &'a Partition,
    model: &'a dyn ScoringModel,
    max_candidates: usize,
}

impl<'a> AggregateGate<'a> {
    /// Create a gate.
    ///
    /// # Arguments
    /// * `partition` - Active predicates for the snapshot
    /// * `model` - The model Stage B will score with; bounds come from it
    /// * `max_candidates` - Cap on strict candidates
    pub fn new(partition: &'a Partition, model: &'a dyn ScoringModel, max_candidates: usize) -> Self {
        Self {
            partition,
            model,
            max_candidates,
        }
    }

    /// Run the pass. Deterministic: the same inputs give the same output.
    #[instrument(skip_all, fields(items = ctx.len(), cheap = self.partition.cheap.len()))]
    pub fn run(&self, ctx: &EvalContext<'_>) -> GateOutput {
        let tiers = self.evaluate_cheap(ctx);
        let totals = self.partition.total_counts();
        let heavy = self.partition.heavy_counts();
        let continuous = self.model.kind() == ScoringModelKind::Continuous;
        let source = ctx.source;

        let (mut candidates, mut near_misses): (Vec<Candidate>, Vec<Candidate>) =
            (0..ctx.len() as ItemId)
                .into_par_iter()
                .filter(|&item| !source.is_excluded(item))
                .filter_map(|item| self.classify(ctx, &tiers, totals, heavy, continuous, item))
                .partition(|candidate| !candidate.near_miss);

        let scanned = ctx.eligible(ctx.all_items()).count();

        candidates.par_sort_unstable_by(by_upper_bound);
        near_misses.par_sort_unstable_by(by_upper_bound);

        let truncated = candidates.len().saturating_sub(self.max_candidates);
        candidates.truncate(self.max_candidates);
        near_misses.truncate(self.max_candidates);

        debug!(
            scanned,
            strict = candidates.len(),
            near_misses = near_misses.len(),
            truncated,
            "Aggregate gate finished"
        );

        GateOutput {
            candidates,
            near_misses,
            scanned,
            truncated,
        }
    }

    fn evaluate_cheap(&self, ctx: &EvalContext<'_>) -> TierBitmaps<'a> {
        let bitmaps: Vec<MembershipBitmap> = self
            .partition
            .cheap
            .par_iter()
            .map(|resolved| resolved.predicate.evaluate(ctx))
            .collect();

        let mut tiers = TierBitmaps {
            must_have: Vec::new(),
            must_not_have: Vec::new(),
            priority: Vec::new(),
            preferred: Vec::new(),
        };
        for (resolved, bitmap) in self.partition.cheap.iter().zip(bitmaps) {
            match resolved.importance {
                Importance::MustHave => tiers.must_have.push((resolved, bitmap)),
                Importance::MustNotHave => tiers.must_not_have.push(bitmap),
                Importance::Priority => tiers.priority.push((resolved, bitmap)),
                Importance::Preferred => tiers.preferred.push((resolved, bitmap)),
                Importance::Ignored => {}
            }
        }
        tiers
    }

    fn classify(
        &self,
        ctx: &EvalContext<'_>,
        tiers: &TierBitmaps<'_>,
        totals: TierCounts,
        heavy: TierCounts,
        continuous: bool,
        item: ItemId,
    ) -> Option<Candidate> {
        if tiers.must_not_have.iter().any(|bitmap| bitmap.contains(item)) {
            return None;
        }

        let must_have_hits = tiers
            .must_have
            .iter()
            .filter(|(_, bitmap)| bitmap.contains(item))
            .count();
        let missed = tiers.must_have.len() - must_have_hits;
        if missed > 1 {
            return None;
        }

        // Binary model: a miss is worth 0. Continuous: the predicate's degree.
        let value = |resolved: &ResolvedPredicate, bitmap: &MembershipBitmap| -> (bool, f32) {
            if bitmap.contains(item) {
                (true, 1.0)
            } else if continuous {
                (false, resolved.predicate.membership(ctx, item))
            } else {
                (false, 0.0)
            }
        };

        let mut matches = TierCounts::default();
        let mut cheap = CategoryValues::new(totals);
        for (resolved, bitmap) in &tiers.must_have {
            let (hit, membership) = value(resolved, bitmap);
            cheap.add_must_have(hit, membership);
        }
        matches.must_have = must_have_hits;
        for (resolved, bitmap) in &tiers.priority {
            let (hit, membership) = value(resolved, bitmap);
            matches.priority += hit as usize;
            cheap.priority += membership;
        }
        for (resolved, bitmap) in &tiers.preferred {
            let (hit, membership) = value(resolved, bitmap);
            matches.preferred += hit as usize;
            cheap.preferred += membership;
        }
        if let Some(column) = &ctx.config.params.auxiliary_column {
            cheap.aux = ctx
                .source
                .numeric(column, item)
                .map_or(0.0, |value| value.clamp(0.0, 1.0));
        }

        let upper_bound = self.model.upper_bound(&optimistic(&cheap, heavy));
        Some(Candidate {
            item,
            upper_bound,
            matches,
            near_miss: missed == 1,
            cheap,
        })
    }
}

/// Cheap values with every heavy predicate assumed to go the item's way.
pub fn optimistic(cheap: &CategoryValues, heavy: TierCounts) -> CategoryValues {
    let mut values = *cheap;
    for _ in 0..heavy.must_have {
        values.add_must_have(true, 1.0);
    }
    // Same additions, in the same order, as scoring a full match
    for _ in 0..heavy.priority {
        values.priority += 1.0;
    }
    for _ in 0..heavy.preferred {
        values.preferred += 1.0;
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{kappa, BinaryModel};
    use data_loader::{Dataset, ItemRecord};
    use predicates::builtin::TagPredicate;
    use predicates::{PredicateRegistry, SearchConfig};
    use std::sync::Arc;

    /// Ten items; P1 = {1,2,3,4}, P2 = {2,3,4,5}, item 9 excluded.
    fn create_test_dataset() -> Dataset {
        let records = (0..10)
            .map(|i| {
                let mut record = ItemRecord::new(i);
                if (1..=4).contains(&i) {
                    record = record.with_tag("p1");
                }
                if (2..=5).contains(&i) {
                    record = record.with_tag("p2");
                }
                if i % 2 == 0 {
                    record = record.with_tag("even");
                }
                if i == 9 {
                    record = record.excluded();
                }
                record
            })
            .collect();
        Dataset::from_records(records).unwrap()
    }

    fn create_test_registry() -> PredicateRegistry {
        PredicateRegistry::new()
            .with(Arc::new(TagPredicate::new("p1", "p1")))
            .unwrap()
            .with(Arc::new(TagPredicate::new("p2", "p2")))
            .unwrap()
            .with(Arc::new(TagPredicate::new("even", "even")))
            .unwrap()
            .with(Arc::new(TagPredicate::new("heavy", "p1").heavy()))
            .unwrap()
    }

    fn run(config: &SearchConfig, max_candidates: usize) -> GateOutput {
        let dataset = create_test_dataset();
        let partition = create_test_registry().partition(config);
        let model = BinaryModel::new(partition.total_counts());
        let ctx = EvalContext::new(&dataset, config);
        AggregateGate::new(&partition, &model, max_candidates).run(&ctx)
    }

    fn items(candidates: &[Candidate]) -> Vec<ItemId> {
        let mut items: Vec<ItemId> = candidates.iter().map(|c| c.item).collect();
        items.sort_unstable();
        items
    }

    #[test]
    fn test_strict_and_near_miss_split() {
        let config = SearchConfig::new()
            .with_importance("p1", Importance::MustHave)
            .with_importance("p2", Importance::MustHave);
        let output = run(&config, 100);

        assert_eq!(items(&output.candidates), vec![2, 3, 4]);
        assert_eq!(items(&output.near_misses), vec![1, 5]);
        assert!(output.near_misses.iter().all(|c| c.near_miss));
        assert_eq!(output.scanned, 9);
    }

    #[test]
    fn test_must_not_have_is_or() {
        let config = SearchConfig::new()
            .with_importance("p1", Importance::MustNotHave)
            .with_importance("p2", Importance::MustNotHave);
        let output = run(&config, 100);

        // Anything in P1 ∪ P2 is out, plus excluded item 9
        assert_eq!(items(&output.candidates), vec![0, 6, 7, 8]);
        assert!(output.near_misses.is_empty());
    }

    #[test]
    fn test_no_cheap_must_have_admits_every_eligible_item() {
        let config = SearchConfig::new().with_importance("even", Importance::Preferred);
        let output = run(&config, 100);
        assert_eq!(items(&output.candidates), (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn test_upper_bound_counts_heavy_as_matched() {
        let config = SearchConfig::new()
            .with_importance("p1", Importance::MustHave)
            .with_importance("heavy", Importance::MustHave)
            .with_importance("even", Importance::Preferred);
        let output = run(&config, 100);

        let k = kappa(2, 1);
        let item2 = output.candidates.iter().find(|c| c.item == 2).unwrap();
        let item1 = output.candidates.iter().find(|c| c.item == 1).unwrap();
        assert!((item2.upper_bound - 1.0).abs() < 1e-6);
        assert!((item1.upper_bound - k).abs() < 1e-6);
        assert_eq!(item2.matches.preferred, 1);
    }

    #[test]
    fn test_sorted_descending_and_capped() {
        let config = SearchConfig::new()
            .with_importance("p1", Importance::Priority)
            .with_importance("p2", Importance::Priority);
        let output = run(&config, 3);

        assert_eq!(output.candidates.len(), 3);
        assert_eq!(output.truncated, 6);
        let ids: Vec<ItemId> = output.candidates.iter().map(|c| c.item).collect();
        // {2,3,4} match both; ties break toward the lower index
        assert_eq!(ids, vec![2, 3, 4]);
        assert!(output
            .candidates
            .windows(2)
            .all(|w| w[0].upper_bound >= w[1].upper_bound));
    }

    #[test]
    fn test_gate_is_idempotent() {
        let config = SearchConfig::new()
            .with_importance("p1", Importance::MustHave)
            .with_importance("even", Importance::Priority);
        let first = run(&config, 4);
        let second = run(&config, 4);
        assert_eq!(first.candidates, second.candidates);
        assert_eq!(first.near_misses, second.near_misses);
    }
}
