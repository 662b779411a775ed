//! Predicate declarations read from configuration files.
//!
//! A search file carries both the predicate catalog (what can be asked) and
//! the snapshot (what is asked this time):
//!
//! ```toml
//! [[predicate]]
//! id = "temperature"
//! kind = "range"
//! column = "temp"
//!
//! [[predicate]]
//! id = "cave"
//! kind = "tag"
//! tag = "cave"
//! heavy = true
//!
//! [importance]
//! cave = "must_have"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::builtin::{CategoryPredicate, GroupPredicate, RangePredicate, TagPredicate, WholeDataset};
use crate::config::SearchConfig;
use crate::error::{ConfigError, Result};
use crate::registry::PredicateRegistry;
use crate::traits::Predicate;

/// Shape of a declared predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredicateKind {
    Range { column: String },
    Tag { tag: String },
    Category { column: String, value: String },
    /// Categorical group when `column` is set, tag group otherwise
    Group { column: Option<String> },
}

/// One `[[predicate]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredicateSpec {
    pub id: String,
    #[serde(flatten)]
    pub kind: PredicateKind,
    #[serde(default)]
    pub heavy: bool,
    #[serde(default = "default_chunkable")]
    pub chunkable: bool,
}

fn default_chunkable() -> bool {
    true
}

impl PredicateSpec {
    pub fn build(&self) -> Result<Arc<dyn Predicate>> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::InvalidPredicate {
                id: self.id.clone(),
                reason: "empty id".to_string(),
            });
        }
        let predicate: Arc<dyn Predicate> = match &self.kind {
            PredicateKind::Range { column } => {
                let p = RangePredicate::new(&self.id, column);
                if self.heavy { Arc::new(p.heavy()) } else { Arc::new(p) }
            }
            PredicateKind::Tag { tag } => {
                let p = TagPredicate::new(&self.id, tag);
                if self.heavy { Arc::new(p.heavy()) } else { Arc::new(p) }
            }
            PredicateKind::Category { column, value } => {
                let p = CategoryPredicate::new(&self.id, column, value);
                if self.heavy { Arc::new(p.heavy()) } else { Arc::new(p) }
            }
            PredicateKind::Group { column } => {
                let p = match column {
                    Some(column) => GroupPredicate::category(&self.id, column),
                    None => GroupPredicate::tags(&self.id),
                };
                if self.heavy { Arc::new(p.heavy()) } else { Arc::new(p) }
            }
        };
        if self.chunkable {
            Ok(predicate)
        } else {
            Ok(Arc::new(WholeDataset::new(predicate)))
        }
    }
}

/// Build a registry from catalog entries.
pub fn build_registry(specs: &[PredicateSpec]) -> Result<PredicateRegistry> {
    let mut registry = PredicateRegistry::new();
    for spec in specs {
        registry.register(spec.build()?)?;
    }
    Ok(registry)
}

/// Catalog plus snapshot, as stored in one TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFile {
    #[serde(default, rename = "predicate")]
    pub predicates: Vec<PredicateSpec>,
    #[serde(flatten)]
    pub config: SearchConfig,
}

impl SearchFile {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: SearchFile = toml::from_str(content)?;
        file.config.validate()?;
        Ok(file)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn registry(&self) -> Result<PredicateRegistry> {
        build_registry(&self.predicates)
    }
}
