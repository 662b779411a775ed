//! Core traits for scoring.
//!
//! A scoring model is a pure function from per-category match values to one
//! score. Stage A calls it with optimistic values (every heavy predicate
//! assumed to match) to get an upper bound; Stage B calls it with the real
//! values. Both stages must use the same model instance.

use predicates::{ScoringModelKind, TierCounts};
use serde::Serialize;

/// Per-category match values for one item.
///
/// Sums are over the predicates of a tier: hard matches count 1, continuous
/// memberships count their degree.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CategoryValues {
    /// Number of active predicates per tier, cheap and heavy together
    pub totals: TierCounts,
    /// MustHave predicates the item hard-matches
    pub must_have_hits: usize,
    /// Sum of MustHave memberships
    pub must_have: f32,
    /// Lowest MustHave membership, 1.0 when there are none
    pub worst_must_have: f32,
    pub priority: f32,
    pub preferred: f32,
    /// Auxiliary score in `[0, 1]`
    pub aux: f32,
}

impl CategoryValues {
    pub fn new(totals: TierCounts) -> Self {
        Self {
            totals,
            worst_must_have: 1.0,
            ..Self::default()
        }
    }

    /// Record one MustHave predicate with the given membership.
    pub fn add_must_have(&mut self, hit: bool, membership: f32) {
        if hit {
            self.must_have_hits += 1;
        }
        self.must_have += membership;
        self.worst_must_have = self.worst_must_have.min(membership);
    }

    /// Fraction of MustHave predicates hard-matched (1.0 when there are none)
    pub fn hard_fraction(&self) -> f32 {
        fraction(self.must_have_hits as f32, self.totals.must_have)
    }

    /// Mean MustHave membership (1.0 when there are none)
    pub fn must_have_mean(&self) -> f32 {
        fraction(self.must_have, self.totals.must_have)
    }

    /// Mix the per-tier scoring fractions with the given tier weights.
    ///
    /// Only configured tiers take part, so a single configured tier collapses
    /// to its own fraction. No scoring predicates at all gives 0.
    pub fn scoring_mix(&self, priority_weight: f32, preferred_weight: f32) -> f32 {
        let mut weighted = 0.0;
        let mut weight = 0.0;
        if self.totals.priority > 0 {
            weighted += priority_weight * fraction(self.priority, self.totals.priority);
            weight += priority_weight;
        }
        if self.totals.preferred > 0 {
            weighted += preferred_weight * fraction(self.preferred, self.totals.preferred);
            weight += preferred_weight;
        }
        if weight > 0.0 { weighted / weight } else { 0.0 }
    }
}

fn fraction(sum: f32, count: usize) -> f32 {
    if count == 0 { 1.0 } else { sum / count as f32 }
}

/// Explanation of one score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub model: ScoringModelKind,
    /// Hard-match fraction, compared against strictness
    pub hard_fraction: f32,
    /// Critical component: MustHave fraction or mean membership
    pub critical: f32,
    /// Priority/Preferred component
    pub scoring: f32,
    pub auxiliary: f32,
    /// Multiplier on the weighted sum; 1.0 under the binary model
    pub penalty: f32,
    pub critical_weight: f32,
    pub scoring_weight: f32,
    pub auxiliary_weight: f32,
    pub total: f32,
}

/// Combines category values into a score in `[0, 1]`.
///
/// ## Design Note
/// Implementations must be monotone non-decreasing in every field of
/// `CategoryValues` other than `totals`. Upper bounds and pruning rely on it.
pub trait ScoringModel: Send + Sync {
    fn kind(&self) -> ScoringModelKind;

    /// Score an item and explain the result.
    fn score(&self, values: &CategoryValues) -> ScoreBreakdown;

    /// Upper bound from optimistic values. Same as the score by default.
    fn upper_bound(&self, optimistic: &CategoryValues) -> f32 {
        self.score(optimistic).total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn totals(must_have: usize, priority: usize, preferred: usize) -> TierCounts {
        TierCounts {
            must_have,
            must_not_have: 0,
            priority,
            preferred,
        }
    }

    #[test]
    fn test_empty_tiers_default_to_neutral_values() {
        let values = CategoryValues::new(TierCounts::default());
        assert_eq!(values.hard_fraction(), 1.0);
        assert_eq!(values.must_have_mean(), 1.0);
        assert_eq!(values.worst_must_have, 1.0);
        assert_eq!(values.scoring_mix(2.0, 1.0), 0.0);
    }

    #[test]
    fn test_add_must_have_tracks_worst() {
        let mut values = CategoryValues::new(totals(3, 0, 0));
        values.add_must_have(true, 1.0);
        values.add_must_have(false, 0.4);
        values.add_must_have(true, 1.0);

        assert_eq!(values.must_have_hits, 2);
        assert!((values.hard_fraction() - 2.0 / 3.0).abs() < 1e-6);
        assert!((values.must_have_mean() - 0.8).abs() < 1e-6);
        assert_eq!(values.worst_must_have, 0.4);
    }

    #[test]
    fn test_scoring_mix_collapses_to_single_tier() {
        let mut values = CategoryValues::new(totals(0, 0, 4));
        values.preferred = 1.0;
        assert_eq!(values.scoring_mix(2.0, 1.0), 0.25);

        let mut values = CategoryValues::new(totals(0, 2, 2));
        values.priority = 2.0;
        values.preferred = 0.0;
        assert!((values.scoring_mix(2.0, 1.0) - 2.0 / 3.0).abs() < 1e-6);
    }
}
