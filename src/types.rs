use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// One imported clinical resource: an ordered mapping of keys to JSON values
pub type Record = Map<String, Value>;

/// Represents the identifier a stored resource is keyed by
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        ResourceId(id.into())
    }

    /// Take the identifier from the record's `id` field, or synthesize one from the line number
    ///
    /// Synthesized identifiers are only unique within a single input file.
    pub fn for_record(record: &Record, line_number: usize) -> Self {
        match record.get("id") {
            Some(Value::String(s)) if !s.is_empty() => ResourceId::new(s.clone()),
            Some(Value::Number(n)) => ResourceId::new(n.to_string()),
            _ => ResourceId::new(format!("line-{}", line_number)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The persisted form of a record - one row in the resource table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResource {
    pub id: ResourceId,

    /// Discriminator copied from the record's `resourceType`
    pub resource_type: String,

    /// Denormalized `subject.reference`, indexed for filtering
    pub subject_reference: Option<String>,

    /// The full record as imported
    pub raw_data: Record,

    /// The extractor's output for this record (may be empty)
    pub extracted_fields: Record,

    pub imported_at: DateTime<Utc>,
}

/// Category of a per-line import failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ParseError,
    ValidationError,
    ProcessingError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ParseError => "parse_error",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::ProcessingError => "processing_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All errors recorded against one input line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub line_number: usize,
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub errors: Vec<String>,
}

impl ErrorEntry {
    pub fn new(line_number: usize, kind: ErrorKind, errors: Vec<String>) -> Self {
        ErrorEntry {
            line_number,
            kind,
            errors,
        }
    }
}

/// A recommended-but-absent optional field on an otherwise valid record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingFieldWarning {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

/// Statistics snapshot taken at the end of an import run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportStatistics {
    pub resource_types: BTreeMap<String, usize>,
    pub unique_patients: usize,

    /// Capped list of the distinct patient identifiers seen
    pub unique_patient_references: Vec<String>,
}

/// Immutable audit record of one import run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportLog {
    pub id: Uuid,
    pub imported_at: DateTime<Utc>,
    pub total_lines: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<ErrorEntry>,
    pub statistics: ImportStatistics,
}

/// Outcome counts of committing one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Structured summary returned to the caller of an import run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub total_lines: usize,
    pub successful_imports: usize,
    pub failed_imports: usize,
    pub validation_errors: Vec<ErrorEntry>,
    pub statistics: ImportStatistics,
    pub warnings: Vec<MissingFieldWarning>,
    pub persisted: UpsertStats,
    pub import_log_id: Uuid,
    pub imported_at: DateTime<Utc>,
}
