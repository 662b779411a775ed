//! Predicate matching one value of a categorical column.

use data_loader::ItemId;

use crate::config::{Fingerprint, SearchConfig};
use crate::traits::{EvalContext, Predicate};
use crate::types::Heaviness;

pub struct CategoryPredicate {
    id: String,
    column: String,
    value: String,
    heaviness: Heaviness,
}

impl CategoryPredicate {
    pub fn new(id: impl Into<String>, column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            column: column.into(),
            value: value.into(),
            heaviness: Heaviness::Cheap,
        }
    }

    pub fn heavy(mut self) -> Self {
        self.heaviness = Heaviness::Heavy;
        self
    }
}

impl Predicate for CategoryPredicate {
    fn id(&self) -> &str {
        &self.id
    }

    fn heaviness(&self) -> Heaviness {
        self.heaviness
    }

    fn matches(&self, ctx: &EvalContext<'_>, item: ItemId) -> bool {
        ctx.source.category(&self.column, item) == Some(self.value.as_str())
    }

    fn fingerprint(&self, _config: &SearchConfig) -> u64 {
        Fingerprint::new(&self.id)
            .str(&self.column)
            .str(&self.value)
            .finish()
    }
}
