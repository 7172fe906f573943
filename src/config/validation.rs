//! Required-field and status rules, per resource type
//!
//! The table has the same shape as its JSON form:
//!
//! ```json
//! {
//!   "all": {"required": ["id", "resourceType", "subject"]},
//!   "Observation": {"required": ["code", "status"], "valid_status": ["final"]}
//! }
//! ```
//!
//! The `all` entry applies to every resource type.

use crate::error::{KilnError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Key of the entry that applies to every resource type
pub const UNIVERSAL_KEY: &str = "all";

/// Rules for one resource type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeRules {
    #[serde(default)]
    pub required: Vec<String>,

    /// Acceptable `status` values; `None` means any status is accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_status: Option<Vec<String>>,
}

impl TypeRules {
    pub fn required(fields: &[&str]) -> Self {
        TypeRules {
            required: fields.iter().map(|f| f.to_string()).collect(),
            valid_status: None,
        }
    }

    pub fn with_valid_status(mut self, statuses: &[&str]) -> Self {
        self.valid_status = Some(statuses.iter().map(|s| s.to_string()).collect());
        self
    }
}

/// The complete validation rule table
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationConfig {
    universal: TypeRules,
    by_type: HashMap<String, TypeRules>,
}

impl ValidationConfig {
    pub fn new(universal: TypeRules, by_type: HashMap<String, TypeRules>) -> Self {
        ValidationConfig { universal, by_type }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut table: HashMap<String, TypeRules> = serde_json::from_str(json)
            .map_err(|e| KilnError::Config(format!("validation table: {}", e)))?;

        let universal = table.remove(UNIVERSAL_KEY).unwrap_or_default();
        if universal.valid_status.is_some() {
            return Err(KilnError::Config(format!(
                "validation table: '{}' entry cannot carry valid_status",
                UNIVERSAL_KEY
            )));
        }

        Ok(ValidationConfig {
            universal,
            by_type: table,
        })
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Universal required fields followed by type-specific ones, without duplicates
    pub fn required_fields(&self, resource_type: &str) -> Vec<&str> {
        let specific = self
            .by_type
            .get(resource_type)
            .map(|rules| rules.required.as_slice())
            .unwrap_or_default();

        let mut fields: Vec<&str> = Vec::new();
        for field in self.universal.required.iter().chain(specific) {
            if !fields.contains(&field.as_str()) {
                fields.push(field);
            }
        }
        fields
    }

    pub fn valid_status(&self, resource_type: &str) -> Option<&[String]> {
        self.by_type
            .get(resource_type)
            .and_then(|rules| rules.valid_status.as_deref())
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let mut by_type = HashMap::new();
        by_type.insert(
            "Observation".to_string(),
            TypeRules::required(&["code", "status"])
                .with_valid_status(&["final", "preliminary", "amended", "corrected"]),
        );
        // Two conflicting status enumerations exist for MedicationRequest; this one
        // matches Procedure and is pending review by the clinical data owner.
        by_type.insert(
            "MedicationRequest".to_string(),
            TypeRules::required(&["medicationCodeableConcept", "status"])
                .with_valid_status(&["completed", "active", "final"]),
        );
        by_type.insert(
            "Procedure".to_string(),
            TypeRules::required(&["code", "status"])
                .with_valid_status(&["completed", "active", "final"]),
        );
        by_type.insert("Condition".to_string(), TypeRules::required(&["code"]));

        ValidationConfig {
            universal: TypeRules::required(&["id", "resourceType", "subject"]),
            by_type,
        }
    }
}
