//! Rule-based validation of incoming records

use crate::config::ValidationConfig;
use crate::types::Record;
use serde_json::Value;

/// Applies a [`ValidationConfig`] to records
///
/// Validation is a pure function of the record and the rule table; it never
/// looks at stored data.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Validator { config }
    }

    /// Check one record, returning every rule violation found
    ///
    /// A record without a usable `resourceType` yields exactly one error,
    /// since no type-specific rule can be chosen. Otherwise the required-field
    /// and status checks both run, so one record can report several problems.
    pub fn validate(&self, record: &Record, line_number: usize) -> Vec<String> {
        let resource_type = match record.get("resourceType") {
            Some(Value::String(t)) if !t.is_empty() => t.as_str(),
            _ => {
                return vec![format!(
                    "Line {}: Missing required field 'resourceType'",
                    line_number
                )]
            }
        };

        let mut errors = Vec::new();

        for field in self.config.required_fields(resource_type) {
            if !record.contains_key(field) {
                errors.push(format!(
                    "Line {}: {} missing required field '{}'",
                    line_number, resource_type, field
                ));
            }
        }

        if let (Some(valid), Some(status)) =
            (self.config.valid_status(resource_type), record.get("status"))
        {
            let accepted = status
                .as_str()
                .is_some_and(|s| valid.iter().any(|v| v == s));
            if !accepted {
                errors.push(format!(
                    "Line {}: Invalid status '{}' for {}",
                    line_number,
                    display_status(status),
                    resource_type
                ));
            }
        }

        errors
    }
}

fn display_status(status: &Value) -> String {
    match status {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
