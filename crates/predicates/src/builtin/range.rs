//! Numeric range predicate with continuous membership.
//!
//! Inside `[min, max]` membership is 1.0. Outside it decays linearly to 0
//! over a margin of `membership_margin × (max − min)`. A zero-width range or
//! zero margin gives a hard step.

use data_loader::ItemId;

use crate::config::{Fingerprint, RangeSpec, SearchConfig};
use crate::traits::{EvalContext, Predicate};
use crate::types::Heaviness;

pub struct RangePredicate {
    id: String,
    column: String,
    heaviness: Heaviness,
}

impl RangePredicate {
    /// The acceptable range is read from `config.ranges[id]` at evaluation time.
    pub fn new(id: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            column: column.into(),
            heaviness: Heaviness::Cheap,
        }
    }

    pub fn heavy(mut self) -> Self {
        self.heaviness = Heaviness::Heavy;
        self
    }

    fn value(&self, ctx: &EvalContext<'_>, item: ItemId) -> Option<(f32, RangeSpec)> {
        let range = *ctx.config.range(&self.id)?;
        let value = ctx.source.numeric(&self.column, item)?;
        Some((value, range))
    }
}

/// Linear decay outside `range` over `margin_fraction` of its width.
pub fn range_membership(value: f32, range: &RangeSpec, margin_fraction: f32) -> f32 {
    if range.contains(value) {
        return 1.0;
    }
    let margin = margin_fraction * range.width();
    if margin <= 0.0 {
        return 0.0;
    }
    let distance = if value < range.min {
        range.min - value
    } else {
        value - range.max
    };
    (1.0 - distance / margin).clamp(0.0, 1.0)
}

impl Predicate for RangePredicate {
    fn id(&self) -> &str {
        &self.id
    }

    fn heaviness(&self) -> Heaviness {
        self.heaviness
    }

    fn matches(&self, ctx: &EvalContext<'_>, item: ItemId) -> bool {
        self.value(ctx, item)
            .is_some_and(|(value, range)| range.contains(value))
    }

    fn membership(&self, ctx: &EvalContext<'_>, item: ItemId) -> f32 {
        match self.value(ctx, item) {
            Some((value, range)) => {
                range_membership(value, &range, ctx.config.params.membership_margin)
            }
            None => 0.0,
        }
    }

    fn fingerprint(&self, config: &SearchConfig) -> u64 {
        let fingerprint = Fingerprint::new(&self.id).str(&self.column);
        match config.range(&self.id) {
            Some(range) => fingerprint.u64(1).f32(range.min).f32(range.max).finish(),
            None => fingerprint.u64(0).finish(),
        }
    }
}
