//! Importance tiers, cost tiers and per-tier counts.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-item match bitmap for one predicate
pub type MembershipBitmap = roaring::RoaringBitmap;

/// How much a predicate matters to the user, resolved from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    /// Hard inclusion; AND across predicates
    MustHave,
    /// Hard exclusion; OR across predicates
    MustNotHave,
    /// Soft scoring, double weight
    Priority,
    /// Soft scoring
    Preferred,
    #[default]
    Ignored,
}

impl Importance {
    /// Rank in the precedence order MustHave > MustNotHave > Priority > Preferred > Ignored
    pub fn precedence(self) -> u8 {
        match self {
            Importance::MustHave => 4,
            Importance::MustNotHave => 3,
            Importance::Priority => 2,
            Importance::Preferred => 1,
            Importance::Ignored => 0,
        }
    }

    /// Highest-precedence importance in `values`, `Ignored` if empty.
    pub fn strongest(values: impl IntoIterator<Item = Importance>) -> Importance {
        values
            .into_iter()
            .max_by_key(|importance| importance.precedence())
            .unwrap_or(Importance::Ignored)
    }

    pub fn is_hard(self) -> bool {
        matches!(self, Importance::MustHave | Importance::MustNotHave)
    }

    pub fn is_scoring(self) -> bool {
        matches!(self, Importance::Priority | Importance::Preferred)
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Importance::MustHave => "must-have",
            Importance::MustNotHave => "must-not-have",
            Importance::Priority => "priority",
            Importance::Preferred => "preferred",
            Importance::Ignored => "ignored",
        };
        f.write_str(label)
    }
}

/// Declared evaluation cost of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Heaviness {
    /// Cheap enough to run over every item in one synchronous pass
    Cheap,
    /// Evaluated incrementally and cached
    Heavy,
}

/// Number of predicates in each importance tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TierCounts {
    pub must_have: usize,
    pub must_not_have: usize,
    pub priority: usize,
    pub preferred: usize,
}

impl TierCounts {
    pub fn add(&mut self, importance: Importance) {
        match importance {
            Importance::MustHave => self.must_have += 1,
            Importance::MustNotHave => self.must_not_have += 1,
            Importance::Priority => self.priority += 1,
            Importance::Preferred => self.preferred += 1,
            Importance::Ignored => {}
        }
    }

    /// Priority + Preferred
    pub fn scoring(&self) -> usize {
        self.priority + self.preferred
    }

    pub fn total(&self) -> usize {
        self.must_have + self.must_not_have + self.priority + self.preferred
    }

    pub fn combined(&self, other: &TierCounts) -> TierCounts {
        TierCounts {
            must_have: self.must_have + other.must_have,
            must_not_have: self.must_not_have + other.must_not_have,
            priority: self.priority + other.priority,
            preferred: self.preferred + other.preferred,
        }
    }
}
