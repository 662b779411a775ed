//! Errors raised while reading, writing or indexing an item file.
//!
//! Loading is the only fallible part of the crate. Once a `Dataset` is built,
//! lookups never fail and missing data surfaces as `None`.

use thiserror::Error;

use crate::types::ItemId;

#[derive(Error, Debug)]
pub enum DataLoadError {
    #[error("Item file {path} does not exist")]
    MissingFile { path: String },

    #[error("I/O error on item file: {0}")]
    Io(#[from] std::io::Error),

    /// A line that could not be split into index, flag, attributes and tags
    #[error("{file}:{line}: {reason}")]
    MalformedLine {
        file: String,
        line: usize,
        reason: String,
    },

    #[error("Line {line}: expected 4 '::'-separated fields (index, valid, attributes, tags), found {found}")]
    WrongFieldCount { line: usize, found: usize },

    #[error("Line {line}: valid flag must be 0 or 1, got '{value}'")]
    BadValidFlag { line: usize, value: String },

    #[error("Item index {id} appears more than once")]
    DuplicateItem { id: ItemId },

    /// Indices must cover `0..N` without gaps
    #[error("Item indices skip from {expected} to {found}")]
    IndexGap { expected: ItemId, found: ItemId },
}

/// Convenient Result type alias for dataset loading
pub type Result<T> = std::result::Result<T, DataLoadError>;
