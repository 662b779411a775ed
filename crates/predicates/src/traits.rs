//! The predicate contract.
//!
//! A predicate answers "does item i satisfy condition X" (`matches`) and
//! "to what degree" (`membership`). It declares its cost tier and resolves its
//! own importance from a configuration snapshot, so there is no central table
//! mapping ids to settings.

use data_loader::{DataSource, ItemId};
use std::ops::Range;

use crate::config::{Fingerprint, SearchConfig};
use crate::types::{Heaviness, Importance, MembershipBitmap};

/// Everything a predicate may look at while evaluating.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub source: &'a dyn DataSource,
    pub config: &'a SearchConfig,
}

impl<'a> EvalContext<'a> {
    pub fn new(source: &'a dyn DataSource, config: &'a SearchConfig) -> Self {
        Self { source, config }
    }

    /// Dataset size N
    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Full index range `0..N`
    pub fn all_items(&self) -> Range<ItemId> {
        0..self.len() as ItemId
    }

    /// Items in `window` that are not excluded at the data-source level.
    pub fn eligible(&self, window: Range<ItemId>) -> impl Iterator<Item = ItemId> + 'a {
        let source = self.source;
        let end = window.end.min(source.len() as ItemId);
        (window.start..end).filter(move |&item| !source.is_excluded(item))
    }
}

/// Core trait for item predicates.
///
/// `Send + Sync` lets cheap predicates be evaluated in parallel during the
/// one synchronous full-dataset pass.
pub trait Predicate: Send + Sync {
    /// Stable identifier, also the configuration key
    fn id(&self) -> &str;

    fn heaviness(&self) -> Heaviness;

    /// Importance under `config`. Plain predicates look up their id.
    fn importance(&self, config: &SearchConfig) -> Importance {
        config.importance_of(self.id())
    }

    /// Hard match. Missing data must yield `false`.
    fn matches(&self, ctx: &EvalContext<'_>, item: ItemId) -> bool;

    /// Continuous degree of match in `[0, 1]`; must be 1.0 whenever `matches` is true.
    fn membership(&self, ctx: &EvalContext<'_>, item: ItemId) -> f32 {
        if self.matches(ctx, item) { 1.0 } else { 0.0 }
    }

    /// Hash of the configuration parameters that affect `matches`.
    fn fingerprint(&self, _config: &SearchConfig) -> u64 {
        Fingerprint::new(self.id()).finish()
    }

    /// Whether `evaluate_window` may be called on partial windows.
    fn is_chunkable(&self) -> bool {
        true
    }

    /// Record every eligible item of `window` that matches into `out`.
    fn evaluate_window(&self, ctx: &EvalContext<'_>, window: Range<ItemId>, out: &mut MembershipBitmap) {
        for item in ctx.eligible(window) {
            if self.matches(ctx, item) {
                out.insert(item);
            }
        }
    }

    /// Match bitmap over the whole dataset. Excluded items are never set.
    fn evaluate(&self, ctx: &EvalContext<'_>) -> MembershipBitmap {
        let mut out = MembershipBitmap::new();
        self.evaluate_window(ctx, ctx.all_items(), &mut out);
        out
    }
}
