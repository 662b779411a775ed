//! # Data Loader Crate
//!
//! Loads and indexes the item dataset the ranking engine searches over.
//!
//! ## Main Components
//!
//! - **types**: `ItemRecord`, `Dataset` and its columns
//! - **parser**: read and write `.dat` item files
//! - **index**: build the column-oriented `Dataset` from records
//! - **source**: the `DataSource` trait the engine and predicates consume
//! - **generation**: process-wide dataset generation counter
//! - **error**: error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::{DataSource, Dataset};
//! use std::path::Path;
//!
//! let dataset = Dataset::load_from_file(Path::new("data/items.dat"))?;
//! println!("{} items, generation {}", dataset.len(), dataset.generation());
//! ```

pub mod error;
pub mod generation;
pub mod index;
pub mod parser;
pub mod source;
pub mod types;

pub use error::{DataLoadError, Result};
pub use generation::{current_generation, next_generation, Generation};
pub use source::DataSource;
pub use types::{
    AttributeValue, CategoricalColumn, Dataset, ItemId, ItemRecord, UnresolvedAttribute,
};
