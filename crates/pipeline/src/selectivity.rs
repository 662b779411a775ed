//! Pre-search selectivity estimation.
//!
//! Estimates how many items satisfy the hard constraints before a search is
//! run. Each predicate's match ratio is measured once and cached; the joint
//! estimate assumes the predicates are independent, so it is advisory only.
//!
//! ## Algorithm
//! 1. ratio(p) = matches(p) / N for every MustHave and MustNotHave predicate
//! 2. joint = Π ratio(MustHave) · Π (1 − ratio(MustNotHave))
//! 3. band from the joint ratio and the estimated count joint·N
//! 4. for k = n−1 down to 1: P(at least k of n MustHave match) via the
//!    Poisson-binomial distribution, giving relaxed suggestions

use data_loader::Generation;
use predicates::{EvalContext, Importance, Partition, ResolvedPredicate};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// How restrictive a set of hard constraints is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SelectivityBand {
    /// Every item qualifies
    Guaranteed,
    VeryHigh,
    High,
    Medium,
    Low,
    VeryLow,
    /// Some constraint matches nothing
    Impossible,
}

impl SelectivityBand {
    /// Band for a joint ratio over `total` items.
    pub fn classify(joint_ratio: f64, total: usize) -> Self {
        if joint_ratio >= 1.0 {
            return SelectivityBand::Guaranteed;
        }
        if joint_ratio <= 0.0 {
            return SelectivityBand::Impossible;
        }
        let expected = joint_ratio * total as f64;
        match expected {
            e if e >= 1000.0 => SelectivityBand::VeryHigh,
            e if e >= 100.0 => SelectivityBand::High,
            e if e >= 25.0 => SelectivityBand::Medium,
            e if e >= 5.0 => SelectivityBand::Low,
            _ => SelectivityBand::VeryLow,
        }
    }
}

impl fmt::Display for SelectivityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SelectivityBand::Guaranteed => "guaranteed",
            SelectivityBand::VeryHigh => "very high",
            SelectivityBand::High => "high",
            SelectivityBand::Medium => "medium",
            SelectivityBand::Low => "low",
            SelectivityBand::VeryLow => "very low",
            SelectivityBand::Impossible => "impossible",
        };
        f.write_str(label)
    }
}

/// Match ratio of one hard predicate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredicateSelectivity {
    pub id: String,
    pub importance: Importance,
    pub matches: u64,
    pub ratio: f64,
}

/// "Require k of n MustHave predicates" with its own estimate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelaxationSuggestion {
    pub required: usize,
    pub of: usize,
    pub ratio: f64,
    pub estimated_count: f64,
    pub band: SelectivityBand,
}

/// Estimate for one configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectivityReport {
    pub total_items: usize,
    pub predicates: Vec<PredicateSelectivity>,
    pub joint_ratio: f64,
    pub estimated_count: f64,
    pub band: SelectivityBand,
    /// Most permissive last
    pub suggestions: Vec<RelaxationSuggestion>,
}

struct CachedRatio {
    fingerprint: u64,
    generation: Generation,
    matches: u64,
}

/// Caches per-predicate match counts across estimates.
#[derive(Default)]
pub struct SelectivityEstimator {
    cache: HashMap<String, CachedRatio>,
}

impl SelectivityEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate the hard constraints of `partition` under `ctx`.
    ///
    /// Uncached predicates are counted in parallel, one full pass each.
    pub fn estimate(&mut self, ctx: &EvalContext<'_>, partition: &Partition) -> SelectivityReport {
        let total = ctx.len();
        let generation = ctx.source.generation();

        let hard: Vec<&ResolvedPredicate> = partition
            .iter()
            .filter(|resolved| resolved.importance.is_hard())
            .collect();

        let missing: Vec<&ResolvedPredicate> = hard
            .iter()
            .copied()
            .filter(|resolved| !self.is_cached(resolved, ctx, generation))
            .collect();
        let counted: Vec<(String, u64, u64)> = missing
            .par_iter()
            .map(|resolved| {
                let matches = resolved.predicate.evaluate(ctx).len();
                (
                    resolved.id().to_string(),
                    resolved.predicate.fingerprint(ctx.config),
                    matches,
                )
            })
            .collect();
        debug!(cached = hard.len() - counted.len(), counted = counted.len(), "Selectivity counts ready");
        for (id, fingerprint, matches) in counted {
            self.cache.insert(
                id,
                CachedRatio {
                    fingerprint,
                    generation,
                    matches,
                },
            );
        }

        let predicates: Vec<PredicateSelectivity> = hard
            .iter()
            .map(|resolved| {
                let matches = self.cache.get(resolved.id()).map_or(0, |cached| cached.matches);
                PredicateSelectivity {
                    id: resolved.id().to_string(),
                    importance: resolved.importance,
                    matches,
                    ratio: ratio(matches, total),
                }
            })
            .collect();

        let must_have: Vec<f64> = predicates
            .iter()
            .filter(|p| p.importance == Importance::MustHave)
            .map(|p| p.ratio)
            .collect();
        let exclusion: f64 = predicates
            .iter()
            .filter(|p| p.importance == Importance::MustNotHave)
            .map(|p| 1.0 - p.ratio)
            .product();

        let joint_ratio = must_have.iter().product::<f64>() * exclusion;
        let n = must_have.len();
        let suggestions = if n >= 2 {
            let distribution = poisson_binomial(&must_have);
            (1..n)
                .rev()
                .map(|required| {
                    let ratio = distribution[required..].iter().sum::<f64>() * exclusion;
                    RelaxationSuggestion {
                        required,
                        of: n,
                        ratio,
                        estimated_count: ratio * total as f64,
                        band: SelectivityBand::classify(ratio, total),
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        SelectivityReport {
            total_items: total,
            predicates,
            joint_ratio,
            estimated_count: joint_ratio * total as f64,
            band: SelectivityBand::classify(joint_ratio, total),
            suggestions,
        }
    }

    fn is_cached(&self, resolved: &ResolvedPredicate, ctx: &EvalContext<'_>, generation: Generation) -> bool {
        self.cache.get(resolved.id()).is_some_and(|cached| {
            cached.generation == generation
                && cached.fingerprint == resolved.predicate.fingerprint(ctx.config)
        })
    }

    /// Forget every cached count.
    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

fn ratio(matches: u64, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        matches as f64 / total as f64
    }
}

/// P(exactly k successes) for k in 0..=n, given independent success
/// probabilities.
pub fn poisson_binomial(probabilities: &[f64]) -> Vec<f64> {
    let mut distribution = vec![0.0; probabilities.len() + 1];
    distribution[0] = 1.0;
    for (seen, &p) in probabilities.iter().enumerate() {
        for k in (1..=seen + 1).rev() {
            distribution[k] = distribution[k] * (1.0 - p) + distribution[k - 1] * p;
        }
        distribution[0] *= 1.0 - p;
    }
    distribution
}
