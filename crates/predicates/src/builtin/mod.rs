//! Built-in predicate kinds.
//!
//! Domain-specific predicates usually live outside the engine; these cover
//! the common attribute shapes of a `DataSource` (numeric ranges, tags,
//! categorical values, multi-value groups) and are what the predicate
//! catalog builds from configuration files.

pub mod category;
pub mod group;
pub mod range;
pub mod tag;
pub mod whole;

pub use category::CategoryPredicate;
pub use group::{GroupPredicate, GroupSource};
pub use range::RangePredicate;
pub use tag::TagPredicate;
pub use whole::WholeDataset;
