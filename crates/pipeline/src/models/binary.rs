//! k-of-n hard-match model.
//!
//! Score = κ·critical + (1−κ)·scoring, where critical is the fraction of
//! MustHave predicates matched and scoring mixes the Priority and Preferred
//! match fractions 2:1.

use predicates::{ScoringModelKind, TierCounts};

use crate::traits::{CategoryValues, ScoreBreakdown, ScoringModel};

const PRIORITY_WEIGHT: f32 = 2.0;
const PREFERRED_WEIGHT: f32 = 1.0;

/// Mixing weight between the critical and scoring components.
///
/// κ = 1 when there are no scoring predicates, 0 when there are no MustHave
/// predicates, otherwise 0.5 + 0.5·C/(C+S).
///
/// # Arguments
/// * `must_have` - Total MustHave predicates (C)
/// * `scoring` - Total Priority + Preferred predicates (S)
pub fn kappa(must_have: usize, scoring: usize) -> f32 {
    if scoring == 0 {
        return 1.0;
    }
    if must_have == 0 {
        return 0.0;
    }
    0.5 + 0.5 * must_have as f32 / (must_have + scoring) as f32
}

#[derive(Debug, Clone, Copy)]
pub struct BinaryModel {
    kappa: f32,
}

impl BinaryModel {
    pub fn new(totals: TierCounts) -> Self {
        Self {
            kappa: kappa(totals.must_have, totals.scoring()),
        }
    }

    pub fn kappa(&self) -> f32 {
        self.kappa
    }
}

impl ScoringModel for BinaryModel {
    fn kind(&self) -> ScoringModelKind {
        ScoringModelKind::Binary
    }

    fn score(&self, values: &CategoryValues) -> ScoreBreakdown {
        let critical = values.hard_fraction();
        let scoring = values.scoring_mix(PRIORITY_WEIGHT, PREFERRED_WEIGHT);
        ScoreBreakdown {
            model: ScoringModelKind::Binary,
            hard_fraction: critical,
            critical,
            scoring,
            auxiliary: 0.0,
            penalty: 1.0,
            critical_weight: self.kappa,
            scoring_weight: 1.0 - self.kappa,
            auxiliary_weight: 0.0,
            total: self.kappa * critical + (1.0 - self.kappa) * scoring,
        }
    }
}
