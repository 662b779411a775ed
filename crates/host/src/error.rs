//! Error types for the search host.

use pipeline::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Search rejected: {0}")]
    Engine(#[from] EngineError),

    /// The reply channel closed before a result was sent. Happens when a
    /// newer search replaced this one or the host shut down.
    #[error("Search was superseded or the host stopped")]
    Cancelled,

    #[error("Search host is not running")]
    Stopped,
}

/// Convenient Result type alias for host operations
pub type Result<T> = std::result::Result<T, HostError>;
