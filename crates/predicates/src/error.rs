//! Error types for configuration loading and predicate registration.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Predicate '{0}' is already registered")]
    DuplicatePredicate(String),

    #[error("Predicate '{id}' is misconfigured: {reason}")]
    InvalidPredicate { id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
