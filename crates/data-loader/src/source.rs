//! The data-source contract the ranking engine and predicates are written
//! against.
//!
//! The engine never interprets attributes itself; it only asks how many items
//! exist, which ones are excluded up front, and which generation it is
//! looking at. Predicates use the attribute accessors.

use crate::generation::Generation;
use crate::types::{Dataset, ItemId, UnresolvedAttribute};

/// Opaque per-item attribute provider.
///
/// Missing or unknown data is reported as `None`/`false`; callers treat that
/// as a non-match.
pub trait DataSource: Send + Sync {
    /// Number of items, N. Valid indices are `0..N`.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dataset identity used to scope caches
    fn generation(&self) -> Generation;

    /// Items excluded at the data-source level never reach predicate evaluation
    fn is_excluded(&self, item: ItemId) -> bool;

    fn numeric(&self, column: &str, item: ItemId) -> Option<f32>;

    fn category(&self, column: &str, item: ItemId) -> Option<&str>;

    fn has_tag(&self, tag: &str, item: ItemId) -> bool;

    /// Attributes the source could only resolve as missing
    fn unresolved(&self) -> &[UnresolvedAttribute] {
        &[]
    }
}

impl DataSource for Dataset {
    fn len(&self) -> usize {
        Dataset::len(self)
    }

    fn generation(&self) -> Generation {
        Dataset::generation(self)
    }

    fn is_excluded(&self, item: ItemId) -> bool {
        Dataset::is_excluded(self, item)
    }

    fn numeric(&self, column: &str, item: ItemId) -> Option<f32> {
        Dataset::numeric(self, column, item)
    }

    fn category(&self, column: &str, item: ItemId) -> Option<&str> {
        Dataset::category(self, column, item)
    }

    fn has_tag(&self, tag: &str, item: ItemId) -> bool {
        Dataset::has_tag(self, tag, item)
    }

    fn unresolved(&self) -> &[UnresolvedAttribute] {
        Dataset::unresolved(self)
    }
}
