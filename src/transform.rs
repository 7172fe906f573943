//! Declarative transformation rules applied to records at query time
//!
//! Rules are given as JSON, for example:
//!
//! ```json
//! [
//!   {"action": "flatten", "field": "code.coding[0]"},
//!   {"action": "extract", "field": "valueQuantity.value", "as": "value"}
//! ]
//! ```
//!
//! Output records start from only `id` and `resourceType`; everything else in
//! them comes from the rules.

use crate::error::{KilnError, Result};
use crate::path::FieldPath;
use crate::types::Record;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// One transformation step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum TransformRule {
    /// Promote the entries of a nested mapping to `<firstSegment>_<key>`
    /// and drop the top-level key named by the first segment
    Flatten { field: String },

    /// Bind the value at `field` under `as` (default: the final path segment)
    Extract {
        field: String,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
    },
}

impl TransformRule {
    pub fn flatten(field: impl Into<String>) -> Self {
        TransformRule::Flatten { field: field.into() }
    }

    pub fn extract(field: impl Into<String>, alias: Option<&str>) -> Self {
        TransformRule::Extract {
            field: field.into(),
            alias: alias.map(str::to_string),
        }
    }
}

/// Applies an ordered rule list to records
#[derive(Debug, Clone, Default)]
pub struct TransformEngine {
    rules: Vec<TransformRule>,
}

impl TransformEngine {
    pub fn new(rules: Vec<TransformRule>) -> Self {
        TransformEngine { rules }
    }

    /// Parse a JSON array of rules; unknown actions and missing fields are rejected
    pub fn from_json_str(json: &str) -> Result<Self> {
        let rules: Vec<TransformRule> =
            serde_json::from_str(json).map_err(|e| KilnError::InvalidRule(e.to_string()))?;

        for rule in &rules {
            let field = match rule {
                TransformRule::Flatten { field } => field,
                TransformRule::Extract { field, .. } => field,
            };
            if field.is_empty() {
                return Err(KilnError::InvalidRule(format!(
                    "empty field in {}",
                    serde_json::to_string(rule)?
                )));
            }
        }

        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &[TransformRule] {
        &self.rules
    }

    pub fn apply(&self, records: &[Record]) -> Vec<Record> {
        debug!(records = records.len(), rules = self.rules.len(), "applying transformations");
        records.iter().map(|record| self.apply_one(record)).collect()
    }

    /// Transform one record
    ///
    /// Each rule sees the output of the previous one. Paths are looked up in
    /// that working output first and in the source record second.
    pub fn apply_one(&self, source: &Record) -> Record {
        let mut working = Record::new();
        for key in ["id", "resourceType"] {
            if let Some(value) = source.get(key) {
                working.insert(key.to_string(), value.clone());
            }
        }

        for rule in &self.rules {
            match rule {
                TransformRule::Flatten { field } => {
                    let Some(path) = FieldPath::parse(field) else {
                        continue;
                    };
                    let target = path
                        .resolve_in(&working)
                        .and_then(Value::as_object)
                        .or_else(|| path.resolve_in(source).and_then(Value::as_object))
                        .cloned();
                    if let Some(target) = target {
                        working = promote(&working, path.first_key(), target);
                    }
                }
                TransformRule::Extract { field, alias } => {
                    let value = FieldPath::parse(field)
                        .and_then(|path| {
                            path.resolve_in(&working)
                                .or_else(|| path.resolve_in(source))
                                .cloned()
                        })
                        .unwrap_or(Value::Null);
                    let name = alias.clone().unwrap_or_else(|| default_alias(field).to_string());
                    working.insert(name, value);
                }
            }
        }

        working
    }
}

/// Flatten the mapping at `field_path` into the top level of `obj`
///
/// `{"code": {"coding": [{"system": "s", "code": "c"}]}}` flattened at
/// `code.coding[0]` becomes `{"code_system": "s", "code_code": "c"}`.
/// Paths that do not lead to a mapping leave `obj` unchanged.
pub fn flatten_field(obj: &Record, field_path: &str) -> Record {
    let Some(path) = FieldPath::parse(field_path) else {
        return obj.clone();
    };

    match path.resolve_in(obj) {
        Some(Value::Object(target)) => promote(obj, path.first_key(), target.clone()),
        _ => obj.clone(),
    }
}

/// Resolve `field_path` and bind the result, or null, under `new_name`
pub fn extract_and_rename(obj: &Record, field_path: &str, new_name: &str) -> Record {
    let value = FieldPath::parse(field_path)
        .and_then(|path| path.resolve_in(obj).cloned())
        .unwrap_or(Value::Null);

    let mut result = Record::new();
    result.insert(new_name.to_string(), value);
    result
}

/// Keep records whose top-level values equal every filter value
///
/// The `subject` filter compares against the denormalized `subject_reference`.
/// A key the record lacks compares as null.
pub fn filter_records(records: &[Record], filters: &Record) -> Vec<Record> {
    records
        .iter()
        .filter(|record| {
            filters.iter().all(|(key, expected)| {
                let lookup = if key == "subject" { "subject_reference" } else { key.as_str() };
                record.get(lookup).unwrap_or(&Value::Null) == expected
            })
        })
        .cloned()
        .collect()
}

fn promote(obj: &Record, prefix: &str, target: Map<String, Value>) -> Record {
    let mut result: Record = obj
        .iter()
        .filter(|(key, _)| key.as_str() != prefix)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    for (key, value) in target {
        result.insert(format!("{}_{}", prefix, key), value);
    }
    result
}

fn default_alias(field: &str) -> &str {
    field.rsplit('.').next().unwrap_or(field)
}
