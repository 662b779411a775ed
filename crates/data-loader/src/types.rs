//! Core domain types for item datasets.
//!
//! The ranking engine only ever sees item indices. Everything here exists so
//! that predicates have something to look at: numeric columns, categorical
//! columns and per-item tag sets, stored column-wise for fast full scans.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::generation::Generation;

// =============================================================================
// Type Aliases
// =============================================================================

/// Index of an item in the dataset, always in `0..N`
pub type ItemId = u32;

// =============================================================================
// Record Types (parser output)
// =============================================================================

/// A single attribute value as it appears in a data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Number(f32),
    Text(String),
}

/// One parsed line of an item file.
///
/// `attributes` maps to `None` when the file marks the value as missing (`?`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    /// `false` marks items excluded at the data-source level (e.g. physically
    /// invalid); predicates never see them.
    pub valid: bool,
    pub attributes: BTreeMap<String, Option<AttributeValue>>,
    pub tags: Vec<String>,
}

impl ItemRecord {
    /// Create a valid record with no attributes or tags.
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            valid: true,
            attributes: BTreeMap::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_number(mut self, key: impl Into<String>, value: f32) -> Self {
        self.attributes
            .insert(key.into(), Some(AttributeValue::Number(value)));
        self
    }

    pub fn with_text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(key.into(), Some(AttributeValue::Text(value.into())));
        self
    }

    pub fn with_missing(mut self, key: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), None);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn excluded(mut self) -> Self {
        self.valid = false;
        self
    }
}

/// An attribute that could not be resolved to its column's type.
///
/// The item is kept and the attribute treated as missing; callers can report
/// these instead of failing the whole load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedAttribute {
    pub item: ItemId,
    pub key: String,
    pub reason: String,
}

// =============================================================================
// Columns
// =============================================================================

/// Interned categorical column: each item stores a code into `values`.
#[derive(Debug, Clone, Default)]
pub struct CategoricalColumn {
    pub(crate) values: Vec<String>,
    pub(crate) codes: Vec<Option<u32>>,
}

impl CategoricalColumn {
    pub fn get(&self, item: ItemId) -> Option<&str> {
        let code = (*self.codes.get(item as usize)?)?;
        self.values.get(code as usize).map(String::as_str)
    }

    /// Distinct values seen in this column, in first-seen order
    pub fn distinct_values(&self) -> &[String] {
        &self.values
    }
}

// =============================================================================
// Dataset - The Core In-Memory Store
// =============================================================================

/// Column-oriented, immutable item store.
///
/// Built once by `Dataset::from_records` or `Dataset::load_from_file`; every
/// build takes a fresh generation so dataset-keyed caches can tell a swapped
/// dataset apart from the old one.
#[derive(Debug)]
pub struct Dataset {
    pub(crate) generation: Generation,
    pub(crate) len: usize,
    /// Data-source level exclusion, indexed by item
    pub(crate) excluded: Vec<bool>,
    pub(crate) numeric: HashMap<String, Vec<Option<f32>>>,
    pub(crate) categorical: HashMap<String, CategoricalColumn>,
    /// Tag name -> interned tag id
    pub(crate) tag_ids: HashMap<String, u32>,
    /// Sorted interned tag ids per item
    pub(crate) item_tags: Vec<Vec<u32>>,
    /// Items carrying each tag (secondary index)
    pub(crate) tag_index: HashMap<u32, Vec<ItemId>>,
    pub(crate) unresolved: Vec<UnresolvedAttribute>,
}

impl Dataset {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of items not excluded at the data-source level
    pub fn valid_count(&self) -> usize {
        self.excluded.iter().filter(|&&excluded| !excluded).count()
    }

    pub fn is_excluded(&self, item: ItemId) -> bool {
        // Out-of-range indices are treated as excluded (fail closed)
        self.excluded.get(item as usize).copied().unwrap_or(true)
    }

    pub fn numeric(&self, column: &str, item: ItemId) -> Option<f32> {
        self.numeric.get(column)?.get(item as usize).copied().flatten()
    }

    pub fn category(&self, column: &str, item: ItemId) -> Option<&str> {
        self.categorical.get(column)?.get(item)
    }

    pub fn categorical_column(&self, column: &str) -> Option<&CategoricalColumn> {
        self.categorical.get(column)
    }

    pub fn has_tag(&self, tag: &str, item: ItemId) -> bool {
        let Some(&tag_id) = self.tag_ids.get(tag) else {
            return false;
        };
        self.item_tags
            .get(item as usize)
            .is_some_and(|tags| tags.binary_search(&tag_id).is_ok())
    }

    /// All items carrying `tag`, ascending
    pub fn items_with_tag(&self, tag: &str) -> &[ItemId] {
        self.tag_ids
            .get(tag)
            .and_then(|id| self.tag_index.get(id))
            .map(|items| items.as_slice())
            .unwrap_or(&[])
    }

    pub fn numeric_columns(&self) -> impl Iterator<Item = &str> {
        self.numeric.keys().map(String::as_str)
    }

    pub fn categorical_columns(&self) -> impl Iterator<Item = &str> {
        self.categorical.keys().map(String::as_str)
    }

    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tag_ids.keys().map(String::as_str)
    }

    /// Attributes that were kept as missing because they didn't fit their column
    pub fn unresolved(&self) -> &[UnresolvedAttribute] {
        &self.unresolved
    }
}
