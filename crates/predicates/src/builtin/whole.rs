//! Wrapper for predicates that can only be evaluated over the whole dataset.

use data_loader::ItemId;
use std::ops::Range;
use std::sync::Arc;

use crate::config::SearchConfig;
use crate::traits::{EvalContext, Predicate};
use crate::types::{Heaviness, Importance, MembershipBitmap};

/// Delegates everything to the inner predicate but refuses chunked
/// evaluation, so the cache evaluates it in one synchronous step.
pub struct WholeDataset {
    inner: Arc<dyn Predicate>,
}

impl WholeDataset {
    pub fn new(inner: Arc<dyn Predicate>) -> Self {
        Self { inner }
    }
}

impl Predicate for WholeDataset {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn heaviness(&self) -> Heaviness {
        self.inner.heaviness()
    }

    fn importance(&self, config: &SearchConfig) -> Importance {
        self.inner.importance(config)
    }

    fn matches(&self, ctx: &EvalContext<'_>, item: ItemId) -> bool {
        self.inner.matches(ctx, item)
    }

    fn membership(&self, ctx: &EvalContext<'_>, item: ItemId) -> f32 {
        self.inner.membership(ctx, item)
    }

    fn fingerprint(&self, config: &SearchConfig) -> u64 {
        self.inner.fingerprint(config)
    }

    fn is_chunkable(&self) -> bool {
        false
    }

    fn evaluate_window(&self, ctx: &EvalContext<'_>, window: Range<ItemId>, out: &mut MembershipBitmap) {
        self.inner.evaluate_window(ctx, window, out)
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> MembershipBitmap {
        self.inner.evaluate(ctx)
    }
}
