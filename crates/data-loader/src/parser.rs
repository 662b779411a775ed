//! Parser and writer for item `.dat` files.
//!
//! Format, one item per line:
//!
//! ```text
//! index::valid::key=value;key=value::tag|tag
//! ```
//!
//! - `valid` is `1` or `0` (`0` = excluded at the data-source level)
//! - values that parse as numbers become `Number`, anything else `Text`
//! - `?` marks a missing value
//! - the tag field may be empty
//! - blank lines and lines starting with `#` are skipped

use crate::error::{DataLoadError, Result};
use crate::types::*;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

const FIELD_SEPARATOR: &str = "::";
const MISSING: &str = "?";

/// Parse an item file from disk.
pub fn parse_items(path: &Path) -> Result<Vec<ItemRecord>> {
    if !path.exists() {
        return Err(DataLoadError::MissingFile {
            path: path.display().to_string(),
        });
    }
    let content = fs::read_to_string(path)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    parse_items_str(&content, &file_name)
}

/// Parse item records from in-memory text. `file` is only used in errors.
pub fn parse_items_str(content: &str, file: &str) -> Result<Vec<ItemRecord>> {
    let mut records = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line_trimmed = line.trim();
        if line_trimmed.is_empty() || line_trimmed.starts_with('#') {
            continue;
        }
        records.push(parse_line(line_trimmed, file, line_no)?);
    }

    Ok(records)
}

fn parse_line(line: &str, file: &str, line_no: usize) -> Result<ItemRecord> {
    let parts: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if parts.len() != 4 {
        return Err(DataLoadError::WrongFieldCount {
            line: line_no,
            found: parts.len(),
        });
    }

    let id = parts[0].trim().parse::<ItemId>().map_err(|e| DataLoadError::MalformedLine {
        file: file.to_string(),
        line: line_no,
        reason: format!("Invalid item index: {}", e),
    })?;

    let valid = match parts[1].trim() {
        "1" => true,
        "0" => false,
        other => {
            return Err(DataLoadError::BadValidFlag {
                line: line_no,
                value: other.to_string(),
            });
        }
    };

    let attributes = parse_attributes(parts[2], file, line_no)?;
    let tags = parts[3]
        .split('|')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect();

    Ok(ItemRecord {
        id,
        valid,
        attributes,
        tags,
    })
}

fn parse_attributes(
    field: &str,
    file: &str,
    line_no: usize,
) -> Result<BTreeMap<String, Option<AttributeValue>>> {
    let mut attributes = BTreeMap::new();
    for pair in field.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').ok_or_else(|| DataLoadError::MalformedLine {
            file: file.to_string(),
            line: line_no,
            reason: format!("Attribute without '=': {}", pair),
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(DataLoadError::MalformedLine {
                file: file.to_string(),
                line: line_no,
                reason: "Empty attribute name".to_string(),
            });
        }
        attributes.insert(key.to_string(), parse_value(value.trim()));
    }
    Ok(attributes)
}

fn parse_value(raw: &str) -> Option<AttributeValue> {
    if raw == MISSING {
        return None;
    }
    match raw.parse::<f32>() {
        Ok(number) if number.is_finite() => Some(AttributeValue::Number(number)),
        _ => Some(AttributeValue::Text(raw.to_string())),
    }
}

/// Render one record in `.dat` form (without trailing newline).
pub fn format_record(record: &ItemRecord) -> String {
    let attributes = record
        .attributes
        .iter()
        .map(|(key, value)| match value {
            Some(AttributeValue::Number(n)) => format!("{}={}", key, n),
            Some(AttributeValue::Text(t)) => format!("{}={}", key, t),
            None => format!("{}={}", key, MISSING),
        })
        .collect::<Vec<_>>()
        .join(";");

    format!(
        "{}{sep}{}{sep}{}{sep}{}",
        record.id,
        if record.valid { 1 } else { 0 },
        attributes,
        record.tags.join("|"),
        sep = FIELD_SEPARATOR
    )
}

/// Write records to `path`, one per line.
pub fn write_items(path: &Path, records: &[ItemRecord]) -> Result<()> {
    let file = fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    for record in records {
        writeln!(writer, "{}", format_record(record))?;
    }
    writer.flush()?;
    Ok(())
}
