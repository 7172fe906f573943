//! Which top-level fields the extractor keeps, per resource type

use crate::error::{KilnError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// The string that marks a field as applying to every resource type
pub const ALL_TYPES: &str = "all";

/// The set of resource types a field is extracted for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawApplicability", into = "RawApplicability")]
pub enum Applicability {
    AllTypes,
    Types(Vec<String>),
}

impl Applicability {
    pub fn types(types: &[&str]) -> Self {
        Applicability::Types(types.iter().map(|t| t.to_string()).collect())
    }

    pub fn applies_to(&self, resource_type: &str) -> bool {
        match self {
            Applicability::AllTypes => true,
            Applicability::Types(types) => types.iter().any(|t| t == resource_type),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawApplicability {
    Sentinel(String),
    Types(Vec<String>),
}

impl TryFrom<RawApplicability> for Applicability {
    type Error = String;

    fn try_from(raw: RawApplicability) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawApplicability::Sentinel(s) if s == ALL_TYPES => Ok(Applicability::AllTypes),
            RawApplicability::Sentinel(s) => Err(format!(
                "expected \"{}\" or a list of resource types, got \"{}\"",
                ALL_TYPES, s
            )),
            RawApplicability::Types(types) => Ok(Applicability::Types(types)),
        }
    }
}

impl From<Applicability> for RawApplicability {
    fn from(applicability: Applicability) -> Self {
        match applicability {
            Applicability::AllTypes => RawApplicability::Sentinel(ALL_TYPES.to_string()),
            Applicability::Types(types) => RawApplicability::Types(types),
        }
    }
}

/// Field-to-applicability table driving the extractor and the missing-field report
///
/// Field order is significant: it is the order of extracted fields and of
/// the expected-field scan in analytics.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    fields: Vec<(String, Applicability)>,

    /// resourceType -> optional field worth warning about when absent
    recommended: Vec<(String, String)>,
}

impl ExtractionConfig {
    pub fn new(fields: Vec<(String, Applicability)>) -> Self {
        ExtractionConfig {
            fields,
            recommended: Vec::new(),
        }
    }

    /// Replace the recommended-optional-field table
    pub fn with_recommended(mut self, recommended: Vec<(String, String)>) -> Self {
        self.recommended = recommended;
        self
    }

    /// Parse a table shaped like `{"id": "all", "status": ["Observation"]}`
    ///
    /// The recommended-field table keeps its defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let table: Map<String, Value> = serde_json::from_str(json)
            .map_err(|e| KilnError::Config(format!("extraction table: {}", e)))?;

        let mut fields = Vec::with_capacity(table.len());
        for (field, value) in table {
            let applicability = serde_json::from_value(value)
                .map_err(|e| KilnError::Config(format!("extraction field '{}': {}", field, e)))?;
            fields.push((field, applicability));
        }

        Ok(ExtractionConfig {
            fields,
            recommended: Self::default().recommended,
        })
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Fields extracted for `resource_type`, in table order
    pub fn fields_for<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(_, applicability)| applicability.applies_to(resource_type))
            .map(|(field, _)| field.as_str())
    }

    /// Recommended optional fields for `resource_type` (case-insensitive match)
    pub fn recommended_for<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.recommended
            .iter()
            .filter(move |(t, _)| t.eq_ignore_ascii_case(resource_type))
            .map(|(_, field)| field.as_str())
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        use Applicability::AllTypes;

        let fields = vec![
            ("id", AllTypes),
            ("resourceType", AllTypes),
            ("subject", AllTypes),
            ("code", AllTypes),
            (
                "status",
                Applicability::types(&["Observation", "Procedure", "Condition", "MedicationRequest"]),
            ),
            ("effectiveDateTime", Applicability::types(&["Observation"])),
            ("valueQuantity", Applicability::types(&["Observation"])),
            ("component", Applicability::types(&["Observation"])),
            ("performedDateTime", Applicability::types(&["Procedure"])),
            ("performedPeriod", Applicability::types(&["Procedure"])),
            ("onsetDateTime", Applicability::types(&["Condition"])),
            ("clinicalStatus", Applicability::types(&["Condition"])),
            ("medicationCodeableConcept", Applicability::types(&["MedicationRequest"])),
            ("dosageInstruction", Applicability::types(&["MedicationRequest"])),
            ("authoredOn", Applicability::types(&["MedicationRequest"])),
        ];

        ExtractionConfig {
            fields: fields
                .into_iter()
                .map(|(field, applicability)| (field.to_string(), applicability))
                .collect(),
            recommended: vec![
                ("Observation".to_string(), "effectiveDateTime".to_string()),
                ("MedicationRequest".to_string(), "authoredOn".to_string()),
            ],
        }
    }
}
