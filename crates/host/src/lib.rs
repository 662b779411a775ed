//! Async host for the ranking engine.
//!
//! The engine itself is synchronous and cooperative. This crate owns it on a
//! tokio task, steps it on a fixed tick and routes search requests to it.

pub mod error;
pub mod scheduler;

pub use error::{HostError, Result};
pub use scheduler::{HostConfig, PendingSearch, Progress, SearchHost, SearchOutcome};
