//! Query-time projection of records onto caller-chosen fields

use crate::path;
use crate::types::Record;

/// Shape `record` into exactly the requested fields
///
/// Each requested field becomes one output key, in request order. Fields are
/// resolved as paths (`code.text`, `component[0]`) with a fallback to a
/// literal top-level key, which also covers keys holding an explicit null.
/// Blank and repeated names are ignored.
///
/// `None` means no projection was requested and returns the record as-is.
/// A list whose entries are all blank is treated the same way.
pub fn project(record: &Record, fields: Option<&[String]>) -> Record {
    let Some(fields) = fields else {
        return record.clone();
    };

    let requested: Vec<&str> = fields
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect();

    if requested.is_empty() {
        return record.clone();
    }

    let mut projected = Record::new();
    for field in requested {
        if projected.contains_key(field) {
            continue;
        }

        let found = path::resolve(record, field)
            .filter(|value| !value.is_null())
            .or_else(|| record.get(field));

        if let Some(value) = found {
            projected.insert(field.to_string(), value.clone());
        }
    }

    projected
}

/// Split a comma-separated field list, dropping blanks
pub fn parse_field_list(fields: &str) -> Vec<String> {
    fields
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}
