//! # Predicates Crate
//!
//! The predicate side of the ranking engine:
//!
//! - **traits**: the `Predicate` contract and `EvalContext`
//! - **types**: `Importance`, `Heaviness`, `TierCounts`, `MembershipBitmap`
//! - **config**: the immutable `SearchConfig` snapshot (TOML)
//! - **registry**: `PredicateRegistry` and per-snapshot `Partition`s
//! - **builtin**: range, tag, category and group predicates
//! - **catalog**: `[[predicate]]` declarations and `SearchFile`
//!
//! ## Example Usage
//!
//! ```ignore
//! use predicates::{Importance, PredicateRegistry, SearchConfig};
//! use predicates::builtin::{RangePredicate, TagPredicate};
//! use std::sync::Arc;
//!
//! let mut registry = PredicateRegistry::new();
//! registry.register(Arc::new(TagPredicate::new("river", "river")))?;
//! registry.register(Arc::new(RangePredicate::new("temperature", "temp")))?;
//!
//! let config = SearchConfig::new()
//!     .with_importance("river", Importance::MustHave)
//!     .with_importance("temperature", Importance::Priority)
//!     .with_range("temperature", 10.0, 25.0);
//!
//! let partition = registry.partition(&config);
//! ```

pub mod builtin;
pub mod catalog;
pub mod config;
pub mod error;
pub mod registry;
pub mod traits;
pub mod types;

pub use catalog::{build_registry, PredicateKind, PredicateSpec, SearchFile};
pub use config::{
    FallbackTier, Fingerprint, GroupOperator, GroupSpec, RangeSpec, ScoringModelKind,
    SearchConfig, SearchParams,
};
pub use error::{ConfigError, Result};
pub use registry::{Partition, PredicateRegistry, ResolvedPredicate};
pub use traits::{EvalContext, Predicate};
pub use types::{Heaviness, Importance, MembershipBitmap, TierCounts};
