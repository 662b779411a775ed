//! Fuzzy-membership model with a penalty curve.
//!
//! ## Algorithm
//! 1. critical = mean MustHave membership (1.0 with no MustHave predicates)
//! 2. scoring = weighted average of the mean Priority and Preferred memberships
//! 3. λC and λP are proportional to the MustHave and scoring predicate
//!    counts and share `1 − auxiliary_share`; λaux takes the rest when an
//!    auxiliary column is configured
//! 4. total = penalty(worst MustHave membership) · (λC·critical + λP·scoring + λaux·aux)

use predicates::{ScoringModelKind, SearchParams, TierCounts};

use crate::traits::{CategoryValues, ScoreBreakdown, ScoringModel};

/// Penalty curve α + (1−α)·worst^γ.
///
/// Monotone non-decreasing in `worst` for γ > 0; penalty(0) = α, penalty(1) = 1.
pub fn penalty(worst: f32, alpha: f32, gamma: f32) -> f32 {
    let worst = worst.clamp(0.0, 1.0);
    alpha + (1.0 - alpha) * worst.powf(gamma)
}

#[derive(Debug, Clone, Copy)]
pub struct ContinuousModel {
    alpha: f32,
    gamma: f32,
    priority_weight: f32,
    preferred_weight: f32,
    critical_weight: f32,
    scoring_weight: f32,
    auxiliary_weight: f32,
}

impl ContinuousModel {
    pub fn new(params: &SearchParams, totals: TierCounts) -> Self {
        let aux_share = if params.auxiliary_column.is_some() {
            params.auxiliary_share
        } else {
            0.0
        };
        let categories = (totals.must_have + totals.scoring()) as f32;
        let (critical_weight, scoring_weight, auxiliary_weight) = if categories == 0.0 {
            (0.0, 0.0, if aux_share > 0.0 { 1.0 } else { 0.0 })
        } else {
            let base = 1.0 - aux_share;
            (
                base * totals.must_have as f32 / categories,
                base * totals.scoring() as f32 / categories,
                aux_share,
            )
        };
        Self {
            alpha: params.penalty_alpha,
            gamma: params.penalty_gamma,
            priority_weight: params.priority_weight,
            preferred_weight: params.preferred_weight,
            critical_weight,
            scoring_weight,
            auxiliary_weight,
        }
    }

    /// (λC, λP, λaux)
    pub fn weights(&self) -> (f32, f32, f32) {
        (self.critical_weight, self.scoring_weight, self.auxiliary_weight)
    }
}

impl ScoringModel for ContinuousModel {
    fn kind(&self) -> ScoringModelKind {
        ScoringModelKind::Continuous
    }

    fn score(&self, values: &CategoryValues) -> ScoreBreakdown {
        let critical = values.must_have_mean();
        let scoring = values.scoring_mix(self.priority_weight, self.preferred_weight);
        let auxiliary = values.aux.clamp(0.0, 1.0);
        let penalty = penalty(values.worst_must_have, self.alpha, self.gamma);
        let weighted = self.critical_weight * critical
            + self.scoring_weight * scoring
            + self.auxiliary_weight * auxiliary;
        ScoreBreakdown {
            model: ScoringModelKind::Continuous,
            hard_fraction: values.hard_fraction(),
            critical,
            scoring,
            auxiliary,
            penalty,
            critical_weight: self.critical_weight,
            scoring_weight: self.scoring_weight,
            auxiliary_weight: self.auxiliary_weight,
            total: penalty * weighted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn totals(must_have: usize, priority: usize, preferred: usize) -> TierCounts {
        TierCounts {
            must_have,
            must_not_have: 0,
            priority,
            preferred,
        }
    }

    #[test]
    fn test_penalty_endpoints() {
        assert!((penalty(0.0, 0.1, 2.0) - 0.1).abs() < 1e-6);
        assert!((penalty(1.0, 0.1, 2.0) - 1.0).abs() < 1e-6);
        assert!((penalty(0.5, 0.1, 2.0) - 0.325).abs() < 1e-6);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let mut params = SearchParams::default();
        params.auxiliary_column = Some("quality".to_string());
        let model = ContinuousModel::new(&params, totals(3, 1, 0));
        let (c, p, a) = model.weights();
        assert!((c + p + a - 1.0).abs() < 1e-6);
        assert!((c - 0.675).abs() < 1e-6);
        assert!((a - 0.1).abs() < 1e-6);

        // Without an auxiliary column the share goes back to the categories
        let model = ContinuousModel::new(&SearchParams::default(), totals(3, 1, 0));
        let (c, p, a) = model.weights();
        assert_eq!(a, 0.0);
        assert!((c + p - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_failed_must_have_is_penalised() {
        let totals = totals(2, 1, 0);
        let model = ContinuousModel::new(&SearchParams::default(), totals);

        let mut good = CategoryValues::new(totals);
        good.add_must_have(true, 1.0);
        good.add_must_have(true, 1.0);
        good.priority = 0.5;

        let mut poor = good;
        poor.must_have = 1.0;
        poor.must_have_hits = 1;
        poor.worst_must_have = 0.0;

        let good_score = model.score(&good);
        let poor_score = model.score(&poor);
        assert_eq!(good_score.penalty, 1.0);
        assert!((poor_score.penalty - 0.1).abs() < 1e-6);
        assert!(poor_score.total < good_score.total * 0.2);
        assert_eq!(poor_score.hard_fraction, 0.5);
    }

    proptest! {
        #[test]
        fn prop_penalty_monotone(
            a in 0.0f32..=1.0,
            b in 0.0f32..=1.0,
            alpha in 0.0f32..=1.0,
            gamma in 0.1f32..5.0,
        ) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(penalty(low, alpha, gamma) <= penalty(high, alpha, gamma));
            prop_assert!((penalty(0.0, alpha, gamma) - alpha).abs() < 1e-6);
            prop_assert!((penalty(1.0, alpha, gamma) - 1.0).abs() < 1e-6);
        }
    }
}
