//! Scoring model implementations.
//!
//! Both models implement `ScoringModel` and are chosen per search by
//! `SearchParams::scoring_model`.

pub mod binary;
pub mod continuous;

pub use binary::{kappa, BinaryModel};
pub use continuous::{penalty, ContinuousModel};

use predicates::{ScoringModelKind, SearchParams, TierCounts};

use crate::traits::ScoringModel;

/// Build the configured model for a search with the given tier totals.
pub fn for_params(params: &SearchParams, totals: TierCounts) -> Box<dyn ScoringModel> {
    match params.scoring_model {
        ScoringModelKind::Binary => Box::new(BinaryModel::new(totals)),
        ScoringModelKind::Continuous => Box::new(ContinuousModel::new(params, totals)),
    }
}
