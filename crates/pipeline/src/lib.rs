//! Two-stage constraint ranking engine.
//!
//! This crate provides:
//! - `AggregateGate` (Stage A): one cheap synchronous pass producing
//!   candidates with upper-bound scores
//! - `PredicateCache`: heavy-predicate bitmaps built incrementally
//! - `RankingJob` (Stage B): resumable branch-and-bound top-N
//! - Two `ScoringModel`s: binary k-of-n and continuous membership
//! - `SelectivityEstimator`: pre-search estimate of the hard constraints
//! - `SearchEngine`: job control tying it all together
//!
//! ## Architecture
//! A search runs in two stages:
//! 1. Stage A evaluates cheap predicates over every item, applies the cheap
//!    hard constraints and sorts survivors by upper bound
//! 2. Stage B precomputes heavy predicates in small windows, then walks the
//!    candidates best-first, pruning once the top-N can no longer change
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::SearchEngine;
//! use predicates::SearchFile;
//!
//! let file = SearchFile::from_file(Path::new("search.toml"))?;
//! let mut engine = SearchEngine::new(dataset, file.registry()?);
//!
//! engine.create_job(file.config)?;
//! while !engine.step(256) {
//!     // yield to the host between steps
//! }
//! let results = engine.results();
//! ```

pub mod cache;
pub mod engine;
pub mod error;
pub mod gate;
pub mod job;
pub mod models;
pub mod selectivity;
pub mod traits;

// Re-export main types
pub use cache::{CacheLookup, PredicateCache};
pub use engine::SearchEngine;
pub use error::{EngineError, Result};
pub use gate::{AggregateGate, Candidate, GateOutput};
pub use job::{JobId, JobState, JobStats, RankedItem, RankingJob};
pub use models::{kappa, penalty, BinaryModel, ContinuousModel};
pub use selectivity::{
    RelaxationSuggestion, SelectivityBand, SelectivityEstimator, SelectivityReport,
};
pub use traits::{CategoryValues, ScoreBreakdown, ScoringModel};
