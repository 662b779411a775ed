//! Dataset building and indexing logic.
//!
//! Turns parsed `ItemRecord`s into the column-oriented `Dataset`:
//! - validates that indices cover `0..N` exactly once
//! - infers each column's type from its first present value
//! - builds numeric, categorical and tag columns (in parallel)
//! - builds the tag secondary index

use crate::error::{DataLoadError, Result};
use crate::generation::next_generation;
use crate::parser;
use crate::types::*;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Numeric,
    Categorical,
}

impl Dataset {
    /// Load and index an item file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading item dataset from {:?}", path);
        let records = parser::parse_items(path)?;
        let dataset = Self::from_records(records)?;
        info!(
            items = dataset.len(),
            valid = dataset.valid_count(),
            unresolved = dataset.unresolved().len(),
            generation = dataset.generation(),
            "Dataset indexed"
        );
        Ok(dataset)
    }

    /// Build a dataset from records in any order.
    ///
    /// Steps:
    /// 1. Sort by index and check contiguity
    /// 2. Infer column kinds
    /// 3. Build columns in parallel
    /// 4. Intern tags and build the tag index
    pub fn from_records(mut records: Vec<ItemRecord>) -> Result<Self> {
        records.par_sort_unstable_by_key(|r| r.id);
        validate_indices(&records)?;

        let len = records.len();
        let excluded: Vec<bool> = records.iter().map(|r| !r.valid).collect();

        let kinds = infer_column_kinds(&records);
        debug!("Inferred {} attribute columns", kinds.len());

        // Each column is independent, so build them in parallel
        let built: Vec<(String, BuiltColumn)> = kinds
            .par_iter()
            .map(|(name, kind)| (name.clone(), build_column(&records, name, *kind)))
            .collect();

        let mut numeric = HashMap::new();
        let mut categorical = HashMap::new();
        let mut unresolved = Vec::new();
        for (name, column) in built {
            match column {
                BuiltColumn::Numeric(values, mut issues) => {
                    unresolved.append(&mut issues);
                    numeric.insert(name, values);
                }
                BuiltColumn::Categorical(column, mut issues) => {
                    unresolved.append(&mut issues);
                    categorical.insert(name, column);
                }
            }
        }
        unresolved.sort_by(|a, b| a.item.cmp(&b.item).then_with(|| a.key.cmp(&b.key)));
        if !unresolved.is_empty() {
            warn!(
                "{} attribute values could not be resolved and are treated as missing",
                unresolved.len()
            );
        }

        let (tag_ids, item_tags, tag_index) = build_tags(&records);

        Ok(Self {
            generation: next_generation(),
            len,
            excluded,
            numeric,
            categorical,
            tag_ids,
            item_tags,
            tag_index,
            unresolved,
        })
    }
}

/// Indices must be exactly `0..N` after sorting
fn validate_indices(records: &[ItemRecord]) -> Result<()> {
    for (expected, record) in records.iter().enumerate() {
        let expected = expected as ItemId;
        if record.id == expected {
            continue;
        }
        if expected > 0 && record.id == expected - 1 {
            return Err(DataLoadError::DuplicateItem { id: record.id });
        }
        return Err(DataLoadError::IndexGap {
            expected,
            found: record.id,
        });
    }
    Ok(())
}

/// A column is numeric when its first present value is a number.
fn infer_column_kinds(records: &[ItemRecord]) -> BTreeMap<String, ColumnKind> {
    let mut kinds = BTreeMap::new();
    for record in records {
        for (key, value) in &record.attributes {
            if kinds.contains_key(key) {
                continue;
            }
            match value {
                Some(AttributeValue::Number(_)) => {
                    kinds.insert(key.clone(), ColumnKind::Numeric);
                }
                Some(AttributeValue::Text(_)) => {
                    kinds.insert(key.clone(), ColumnKind::Categorical);
                }
                None => {}
            }
        }
    }
    kinds
}

enum BuiltColumn {
    Numeric(Vec<Option<f32>>, Vec<UnresolvedAttribute>),
    Categorical(CategoricalColumn, Vec<UnresolvedAttribute>),
}

fn build_column(records: &[ItemRecord], name: &str, kind: ColumnKind) -> BuiltColumn {
    let mut issues = Vec::new();
    match kind {
        ColumnKind::Numeric => {
            let values = records
                .iter()
                .map(|record| match record.attributes.get(name) {
                    Some(Some(AttributeValue::Number(n))) => Some(*n),
                    Some(Some(AttributeValue::Text(text))) => {
                        issues.push(UnresolvedAttribute {
                            item: record.id,
                            key: name.to_string(),
                            reason: format!("expected a number, found '{}'", text),
                        });
                        None
                    }
                    _ => None,
                })
                .collect();
            BuiltColumn::Numeric(values, issues)
        }
        ColumnKind::Categorical => {
            let mut column = CategoricalColumn::default();
            let mut lookup: HashMap<String, u32> = HashMap::new();
            for record in records {
                let code = match record.attributes.get(name) {
                    Some(Some(AttributeValue::Text(text))) => {
                        Some(intern(&mut lookup, &mut column.values, text))
                    }
                    Some(Some(AttributeValue::Number(n))) => {
                        // Numbers in a text column are kept as their literal text
                        Some(intern(&mut lookup, &mut column.values, &n.to_string()))
                    }
                    _ => None,
                };
                column.codes.push(code);
            }
            BuiltColumn::Categorical(column, issues)
        }
    }
}

fn intern(lookup: &mut HashMap<String, u32>, values: &mut Vec<String>, value: &str) -> u32 {
    if let Some(&code) = lookup.get(value) {
        return code;
    }
    let code = values.len() as u32;
    values.push(value.to_string());
    lookup.insert(value.to_string(), code);
    code
}

type TagTables = (HashMap<String, u32>, Vec<Vec<u32>>, HashMap<u32, Vec<ItemId>>);

fn build_tags(records: &[ItemRecord]) -> TagTables {
    let mut tag_ids: HashMap<String, u32> = HashMap::new();
    let mut names = Vec::new();
    let mut tag_index: HashMap<u32, Vec<ItemId>> = HashMap::new();

    let item_tags = records
        .iter()
        .map(|record| {
            let mut ids: Vec<u32> = record
                .tags
                .iter()
                .map(|tag| intern(&mut tag_ids, &mut names, tag))
                .collect();
            ids.sort_unstable();
            ids.dedup();
            for &id in &ids {
                tag_index.entry(id).or_insert_with(Vec::new).push(record.id);
            }
            ids
        })
        .collect();

    (tag_ids, item_tags, tag_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::DataSource;

    fn sample_records() -> Vec<ItemRecord> {
        vec![
            ItemRecord::new(2).with_number("temp", 5.0).with_tag("river"),
            ItemRecord::new(0)
                .with_number("temp", 20.0)
                .with_text("biome", "Forest")
                .with_tag("river")
                .with_tag("road"),
            ItemRecord::new(1)
                .with_text("temp", "hot")
                .with_text("biome", "Desert")
                .excluded(),
        ]
    }

    #[test]
    fn test_from_records_builds_columns() {
        let dataset = Dataset::from_records(sample_records()).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.valid_count(), 2);
        assert!(dataset.is_excluded(1));
        assert!(!dataset.is_excluded(0));

        assert_eq!(dataset.numeric("temp", 0), Some(20.0));
        assert_eq!(dataset.numeric("temp", 2), Some(5.0));
        assert_eq!(dataset.category("biome", 1), Some("Desert"));
        assert_eq!(dataset.category("biome", 2), None);

        assert!(dataset.has_tag("river", 0));
        assert!(dataset.has_tag("road", 0));
        assert!(!dataset.has_tag("road", 2));
        assert_eq!(dataset.items_with_tag("river"), &[0, 2]);
        assert!(dataset.items_with_tag("unknown").is_empty());
    }

    #[test]
    fn test_mismatched_values_are_reported_unresolved() {
        let dataset = Dataset::from_records(sample_records()).unwrap();

        // Item 1 has text in the numeric "temp" column
        assert_eq!(dataset.numeric("temp", 1), None);
        assert_eq!(dataset.unresolved().len(), 1);
        assert_eq!(dataset.unresolved()[0].item, 1);
        assert_eq!(dataset.unresolved()[0].key, "temp");
    }

    #[test]
    fn test_out_of_range_lookups_fail_closed() {
        let dataset = Dataset::from_records(sample_records()).unwrap();
        assert!(dataset.is_excluded(99));
        assert_eq!(dataset.numeric("temp", 99), None);
        assert!(!dataset.has_tag("river", 99));
        assert_eq!(dataset.numeric("missing_column", 0), None);
    }

    #[test]
    fn test_non_contiguous_indices_rejected() {
        let records = vec![ItemRecord::new(0), ItemRecord::new(2)];
        let err = Dataset::from_records(records).unwrap_err();
        assert!(matches!(
            err,
            DataLoadError::IndexGap { expected: 1, found: 2 }
        ));
    }

    #[test]
    fn test_duplicate_indices_rejected() {
        let records = vec![ItemRecord::new(0), ItemRecord::new(1), ItemRecord::new(1)];
        let err = Dataset::from_records(records).unwrap_err();
        assert!(matches!(err, DataLoadError::DuplicateItem { id: 1 }));
    }

    #[test]
    fn test_each_build_gets_new_generation() {
        let first = Dataset::from_records(sample_records()).unwrap();
        let second = Dataset::from_records(sample_records()).unwrap();
        assert!(second.generation() > first.generation());
        assert_eq!(DataSource::generation(&second), second.generation());
    }

    #[test]
    fn test_load_missing_file() {
        let err = Dataset::load_from_file(Path::new("does/not/exist.dat")).unwrap_err();
        assert!(matches!(err, DataLoadError::MissingFile { .. }));
    }
}
