//! Field extraction: the canonical subset of a record kept for filtering and projection

use crate::config::ExtractionConfig;
use crate::error::ProcessingError;
use crate::path;
use crate::types::{MissingFieldWarning, Record};
use serde_json::Value;

/// Everything derived from one valid record during import
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedResource {
    pub resource_type: String,
    pub extracted_fields: Record,

    /// `subject.reference`, e.g. `Patient/PT-001`
    pub subject_reference: Option<String>,

    /// Bare patient identifier taken from the reference, e.g. `PT-001`
    pub patient_id: Option<String>,

    pub warnings: Vec<MissingFieldWarning>,
}

/// Extracts configured fields from records
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    config: ExtractionConfig,
}

impl Extractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Extractor { config }
    }

    /// Extract the fields configured for the record's resource type
    ///
    /// Each configured name is looked up as a top-level key first and then as
    /// a nested path. A `subject` mapping also yields `subject_reference` and
    /// `subject_display`. Fields the record lacks are left out.
    pub fn extract(&self, record: &Record) -> Record {
        let mut extracted = Record::new();

        let Some(resource_type) = record.get("resourceType").and_then(Value::as_str) else {
            return extracted;
        };

        for field in self.config.fields_for(resource_type) {
            let Some(value) = record.get(field).or_else(|| path::resolve(record, field)) else {
                continue;
            };

            extracted.insert(field.to_string(), value.clone());

            if field == "subject" {
                if let Value::Object(subject) = value {
                    if let Some(reference) = subject.get("reference") {
                        extracted.insert("subject_reference".to_string(), reference.clone());
                    }
                    if let Some(display) = subject.get("display") {
                        extracted.insert("subject_display".to_string(), display.clone());
                    }
                }
            }
        }

        extracted
    }

    /// Extract fields and derive the subject keys and optional-field warnings
    pub fn process(
        &self,
        record: &Record,
        line_number: usize,
    ) -> Result<ProcessedResource, ProcessingError> {
        let resource_type = record
            .get("resourceType")
            .and_then(Value::as_str)
            .ok_or(ProcessingError::MissingResourceType)?
            .to_string();

        let extracted_fields = self.extract(record);

        let subject_reference = match extracted_fields.get("subject_reference") {
            None | Some(Value::Null) => None,
            Some(Value::String(reference)) => Some(reference.clone()),
            Some(other) => {
                return Err(ProcessingError::InvalidSubjectReference(other.to_string()))
            }
        };

        let patient_id = subject_reference
            .as_deref()
            .filter(|reference| reference.contains('/'))
            .and_then(|reference| reference.rsplit('/').next())
            .map(str::to_string);

        let warnings = self
            .config
            .recommended_for(&resource_type)
            .filter(|field| !extracted_fields.contains_key(*field))
            .map(|field| MissingFieldWarning {
                line_number,
                field: field.to_string(),
                message: format!("{} missing optional field {}", resource_type, field),
            })
            .collect();

        Ok(ProcessedResource {
            resource_type,
            extracted_fields,
            subject_reference,
            patient_id,
            warnings,
        })
    }
}
