//! Multi-value group predicate.
//!
//! A group has many selectable members (categorical values or tags), each
//! with its own importance. The group as a whole takes the strongest member
//! importance, and only members configured at that importance take part in
//! matching. In a MustHave group, MustNotHave members veto the match. Soft
//! members below the group's tier are ignored for that snapshot.

use data_loader::ItemId;

use crate::config::{Fingerprint, GroupOperator, SearchConfig};
use crate::traits::{EvalContext, Predicate};
use crate::types::{Heaviness, Importance};

/// Where a group's members live on an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupSource {
    /// Members are values of a categorical column
    Category(String),
    /// Members are tags
    Tags,
}

pub struct GroupPredicate {
    id: String,
    source: GroupSource,
    heaviness: Heaviness,
}

impl GroupPredicate {
    pub fn category(id: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: GroupSource::Category(column.into()),
            heaviness: Heaviness::Cheap,
        }
    }

    pub fn tags(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: GroupSource::Tags,
            heaviness: Heaviness::Cheap,
        }
    }

    pub fn heavy(mut self) -> Self {
        self.heaviness = Heaviness::Heavy;
        self
    }

    fn has_member(&self, ctx: &EvalContext<'_>, item: ItemId, member: &str) -> bool {
        match &self.source {
            GroupSource::Category(column) => ctx.source.category(column, item) == Some(member),
            GroupSource::Tags => ctx.source.has_tag(member, item),
        }
    }
}

impl Predicate for GroupPredicate {
    fn id(&self) -> &str {
        &self.id
    }

    fn heaviness(&self) -> Heaviness {
        self.heaviness
    }

    fn importance(&self, config: &SearchConfig) -> Importance {
        config
            .group(&self.id)
            .map(|group| group.importance())
            .unwrap_or_default()
    }

    fn matches(&self, ctx: &EvalContext<'_>, item: ItemId) -> bool {
        let Some(group) = ctx.config.group(&self.id) else {
            return false;
        };
        let selected = group.selected_members();
        if selected.is_empty() {
            return false;
        }
        let selected_match = match group.operator {
            GroupOperator::Any => selected.iter().any(|m| self.has_member(ctx, item, m)),
            GroupOperator::All => selected.iter().all(|m| self.has_member(ctx, item, m)),
        };
        selected_match
            && !group
                .excluded_members()
                .iter()
                .any(|m| self.has_member(ctx, item, m))
    }

    fn fingerprint(&self, config: &SearchConfig) -> u64 {
        let mut fingerprint = Fingerprint::new(&self.id);
        fingerprint = match &self.source {
            GroupSource::Category(column) => fingerprint.u64(0).str(column),
            GroupSource::Tags => fingerprint.u64(1),
        };
        if let Some(group) = config.group(&self.id) {
            let operator = match group.operator {
                GroupOperator::Any => 0,
                GroupOperator::All => 1,
            };
            fingerprint = fingerprint.u64(operator);
            for member in group.selected_members() {
                fingerprint = fingerprint.str(member);
            }
            fingerprint = fingerprint.u64(2);
            for member in group.excluded_members() {
                fingerprint = fingerprint.str(member);
            }
        }
        fingerprint.finish()
    }
}
