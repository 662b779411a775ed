//! Predicate matching items that carry a tag.

use data_loader::ItemId;

use crate::config::{Fingerprint, SearchConfig};
use crate::traits::{EvalContext, Predicate};
use crate::types::Heaviness;

pub struct TagPredicate {
    id: String,
    tag: String,
    heaviness: Heaviness,
}

impl TagPredicate {
    pub fn new(id: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
            heaviness: Heaviness::Cheap,
        }
    }

    /// Declare the predicate expensive (evaluated incrementally)
    pub fn heavy(mut self) -> Self {
        self.heaviness = Heaviness::Heavy;
        self
    }
}

impl Predicate for TagPredicate {
    fn id(&self) -> &str {
        &self.id
    }

    fn heaviness(&self) -> Heaviness {
        self.heaviness
    }

    fn matches(&self, ctx: &EvalContext<'_>, item: ItemId) -> bool {
        ctx.source.has_tag(&self.tag, item)
    }

    fn fingerprint(&self, _config: &SearchConfig) -> u64 {
        Fingerprint::new(&self.id).str(&self.tag).finish()
    }
}
