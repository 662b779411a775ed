//! Error types for the ranking engine.

use predicates::ConfigError;
use thiserror::Error;

/// Errors raised when a search cannot be started.
///
/// A search that runs but finds nothing is not an error; it completes with
/// an empty result list.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid search configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Dataset has no items")]
    EmptyDataset,
}

/// Convenient Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
