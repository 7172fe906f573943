//! Import runs: NDJSON in, validated and extracted resources out
//!
//! Each line is parsed, validated and extracted on its own; a bad line is
//! recorded and skipped, never fatal. At the end of the run all successful
//! records are committed as one batch and exactly one [`ImportLog`] is
//! written. Only a failed commit of the batch or its log aborts a run.

pub mod parser;

pub use parser::{json_body_to_lines, parse_lines, ParsedLine};

use crate::config::PipelineConfig;
use crate::error::{KilnError, ProcessingError, Result};
use crate::extract::{Extractor, ProcessedResource};
use crate::store::{Reconciler, ResourceStore};
use crate::types::{
    ErrorEntry, ErrorKind, ImportLog, ImportStatistics, ImportSummary, MissingFieldWarning,
    Record, ResourceId, StoredResource,
};
use crate::validate::Validator;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a single line ended up
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Null or empty content; counts as neither success nor failure
    Skipped,
    Failed(ErrorEntry),
    Successful {
        record: Record,
        processed: ProcessedResource,
    },
}

/// Runs imports against a store
#[derive(Debug, Clone)]
pub struct ImportPipeline {
    validator: Validator,
    extractor: Extractor,
    reconciler: Reconciler,
    max_patient_refs: usize,
}

impl ImportPipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        ImportPipeline {
            validator: Validator::new(config.validation.clone()),
            extractor: Extractor::new(config.extraction.clone()),
            reconciler: Reconciler::new(config.duplicate_policy),
            max_patient_refs: config.max_patient_refs,
        }
    }

    /// Take one parsed line through validation and extraction
    pub fn process_line(&self, line: ParsedLine) -> LineOutcome {
        let line_number = line.line_number;

        let value = match line.parsed {
            Ok(value) => value,
            Err(message) => {
                return LineOutcome::Failed(ErrorEntry::new(
                    line_number,
                    ErrorKind::ParseError,
                    vec![format!("Invalid JSON: {}", message)],
                ))
            }
        };

        if is_empty_content(&value) {
            return LineOutcome::Skipped;
        }

        let record = match value {
            Value::Object(record) => record,
            other => {
                return processing_failure(line_number, ProcessingError::NotAnObject(kind_name(&other)))
            }
        };

        let errors = self.validator.validate(&record, line_number);
        if !errors.is_empty() {
            return LineOutcome::Failed(ErrorEntry::new(
                line_number,
                ErrorKind::ValidationError,
                errors,
            ));
        }

        match self.extractor.process(&record, line_number) {
            Ok(processed) => LineOutcome::Successful { record, processed },
            Err(e) => processing_failure(line_number, e),
        }
    }

    /// Import newline-delimited JSON into `store`
    ///
    /// Returns an error only when the batch commit or the import log write
    /// fails; in that case nothing from this run is stored and no import log
    /// is written.
    pub fn run<S: ResourceStore + ?Sized>(&self, content: &str, store: &mut S) -> Result<ImportSummary> {
        info!("import run started");
        let mut run = RunState::new(self.max_patient_refs);

        for line in parse_lines(content) {
            run.total_lines += 1;
            let line_number = line.line_number;

            match self.process_line(line) {
                LineOutcome::Skipped => {
                    debug!(line = line_number, "skipped empty line");
                }
                LineOutcome::Failed(entry) => {
                    warn!(line = line_number, kind = %entry.kind, errors = ?entry.errors, "line rejected");
                    run.failed += 1;
                    run.errors.push(entry);
                }
                LineOutcome::Successful { record, processed } => {
                    debug!(line = line_number, resource_type = %processed.resource_type, "line accepted");
                    run.accept(line_number, record, processed);
                }
            }
        }

        let imported_at = Utc::now();
        let batch: Vec<StoredResource> = run
            .pending
            .drain(..)
            .map(|pending| StoredResource {
                id: pending.id,
                resource_type: pending.processed.resource_type,
                subject_reference: pending.processed.subject_reference,
                raw_data: pending.record,
                extracted_fields: pending.processed.extracted_fields,
                imported_at,
            })
            .collect();

        let previous = (!batch.is_empty()).then(|| store.table().clone());
        let persisted = if batch.is_empty() {
            Default::default()
        } else {
            self.reconciler.commit(&mut *store, batch)?
        };

        let statistics = run.statistics();
        let log = ImportLog {
            id: Uuid::new_v4(),
            imported_at,
            total_lines: run.total_lines,
            successful: run.successful,
            failed: run.failed,
            errors: run.errors.clone(),
            statistics: statistics.clone(),
        };
        let import_log_id = log.id;
        if let Err(e) = store.append_log(log) {
            // the log is part of the commit unit
            if let Some(previous) = previous {
                if let Err(restore) = store.replace_table(previous) {
                    warn!(error = %restore, "could not restore table after failed log write");
                }
            }
            warn!(error = %e, "import log write failed, batch rolled back");
            return Err(KilnError::Persistence(format!("import log not written: {}", e)));
        }

        info!(
            total = run.total_lines,
            successful = run.successful,
            failed = run.failed,
            import_log = %import_log_id,
            "import run completed"
        );

        Ok(ImportSummary {
            total_lines: run.total_lines,
            successful_imports: run.successful,
            failed_imports: run.failed,
            validation_errors: run.errors,
            statistics,
            warnings: run.warnings,
            persisted,
            import_log_id,
            imported_at,
        })
    }
}

struct PendingResource {
    id: ResourceId,
    record: Record,
    processed: ProcessedResource,
}

/// Counters for one run
struct RunState {
    total_lines: usize,
    successful: usize,
    failed: usize,
    errors: Vec<ErrorEntry>,
    warnings: Vec<MissingFieldWarning>,
    resource_types: BTreeMap<String, usize>,
    patients_seen: HashSet<String>,
    patient_refs: Vec<String>,
    max_patient_refs: usize,
    pending: Vec<PendingResource>,
}

impl RunState {
    fn new(max_patient_refs: usize) -> Self {
        RunState {
            total_lines: 0,
            successful: 0,
            failed: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            resource_types: BTreeMap::new(),
            patients_seen: HashSet::new(),
            patient_refs: Vec::new(),
            max_patient_refs,
            pending: Vec::new(),
        }
    }

    fn accept(&mut self, line_number: usize, record: Record, mut processed: ProcessedResource) {
        self.successful += 1;
        *self
            .resource_types
            .entry(processed.resource_type.clone())
            .or_insert(0) += 1;

        if let Some(patient) = &processed.patient_id {
            if self.patients_seen.insert(patient.clone()) && self.patient_refs.len() < self.max_patient_refs {
                self.patient_refs.push(patient.clone());
            }
        }

        self.warnings.append(&mut processed.warnings);

        self.pending.push(PendingResource {
            id: ResourceId::for_record(&record, line_number),
            record,
            processed,
        });
    }

    fn statistics(&self) -> ImportStatistics {
        ImportStatistics {
            resource_types: self.resource_types.clone(),
            unique_patients: self.patients_seen.len(),
            unique_patient_references: self.patient_refs.clone(),
        }
    }
}

fn processing_failure(line_number: usize, error: ProcessingError) -> LineOutcome {
    LineOutcome::Failed(ErrorEntry::new(
        line_number,
        ErrorKind::ProcessingError,
        vec![format!("Error processing resource: {}", error)],
    ))
}

fn is_empty_content(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DuplicatePolicy;
    use crate::store::{MemoryStore, ResourceTable};
    use crate::types::UpsertStats;

    const OBS_1: &str = r#"{"id": "obs-1", "resourceType": "Observation", "status": "final", "subject": {"reference": "Patient/PT-001"}, "code": {"text": "Heart rate"}, "effectiveDateTime": "2024-01-01T10:00:00Z"}"#;
    const OBS_2: &str = r#"{"id": "obs-2", "resourceType": "Observation", "status": "final", "subject": {"reference": "Patient/PT-002"}, "code": {"text": "Heart rate"}}"#;
    const MED_1: &str = r#"{"id": "med-1", "resourceType": "MedicationRequest", "status": "active", "subject": {"reference": "Patient/PT-001"}, "medicationCodeableConcept": {"text": "Aspirin"}, "authoredOn": "2024-01-02"}"#;
    const BAD_STATUS: &str = r#"{"id": "obs-3", "resourceType": "Observation", "status": "draft", "subject": {"reference": "Patient/PT-003"}, "code": {"text": "x"}}"#;

    fn pipeline() -> ImportPipeline {
        ImportPipeline::new(&PipelineConfig::default())
    }

    #[test]
    fn test_run_counts_successes_and_failures() {
        let content = [OBS_1, OBS_2, "{not json", BAD_STATUS, MED_1].join("\n");
        let mut store = MemoryStore::new();

        let summary = pipeline().run(&content, &mut store).unwrap();

        assert_eq!(summary.total_lines, 5);
        assert_eq!(summary.successful_imports, 3);
        assert_eq!(summary.failed_imports, 2);
        assert_eq!(summary.validation_errors.len(), 2);
        assert_eq!(summary.validation_errors[0].kind, ErrorKind::ParseError);
        assert_eq!(summary.validation_errors[0].line_number, 3);
        assert!(summary.validation_errors[0].errors[0].starts_with("Invalid JSON: "));
        assert_eq!(summary.validation_errors[1].kind, ErrorKind::ValidationError);
        assert_eq!(summary.validation_errors[1].line_number, 4);

        assert_eq!(summary.statistics.resource_types["Observation"], 2);
        assert_eq!(summary.statistics.resource_types["MedicationRequest"], 1);
        assert_eq!(summary.statistics.unique_patients, 2);
        assert_eq!(summary.statistics.unique_patient_references, vec!["PT-001", "PT-002"]);

        assert_eq!(summary.warnings.len(), 1);
        assert_eq!(summary.warnings[0].line_number, 2);
        assert_eq!(summary.warnings[0].field, "effectiveDateTime");

        assert_eq!(summary.persisted, UpsertStats { inserted: 3, updated: 0, skipped: 0 });
        assert_eq!(store.table().len(), 3);
        assert_eq!(store.logs().len(), 1);
        assert_eq!(store.logs()[0].id, summary.import_log_id);
        assert_eq!(store.logs()[0].failed, 2);
    }

    #[test]
    fn test_stored_row_shape() {
        let mut store = MemoryStore::new();
        pipeline().run(OBS_1, &mut store).unwrap();

        let row = store.get(&ResourceId::new("obs-1")).unwrap();
        assert_eq!(row.resource_type, "Observation");
        assert_eq!(row.subject_reference.as_deref(), Some("Patient/PT-001"));
        assert_eq!(row.raw_data["code"]["text"], "Heart rate");
        assert_eq!(row.extracted_fields["subject_reference"], "Patient/PT-001");
    }

    #[test]
    fn test_empty_content_is_skipped() {
        let content = ["null", "{}", OBS_1, "[]"].join("\n");
        let mut store = MemoryStore::new();

        let summary = pipeline().run(&content, &mut store).unwrap();
        assert_eq!(summary.total_lines, 4);
        assert_eq!(summary.successful_imports, 1);
        assert_eq!(summary.failed_imports, 0);
    }

    #[test]
    fn test_non_object_is_processing_error() {
        let mut store = MemoryStore::new();
        let summary = pipeline().run("[1, 2]\n\"text\"", &mut store).unwrap();

        assert_eq!(summary.failed_imports, 2);
        assert!(summary
            .validation_errors
            .iter()
            .all(|e| e.kind == ErrorKind::ProcessingError));
        assert_eq!(
            summary.validation_errors[0].errors[0],
            "Error processing resource: expected a JSON object, found array"
        );
    }

    #[test]
    fn test_all_lines_failing_still_logs() {
        let mut store = MemoryStore::new();
        let summary = pipeline().run("{bad\n{\"id\": 1}", &mut store).unwrap();

        assert_eq!(summary.successful_imports, 0);
        assert_eq!(summary.failed_imports, 2);
        assert_eq!(summary.persisted, UpsertStats::default());
        assert!(store.table().is_empty());
        assert_eq!(store.logs().len(), 1);
    }

    #[test]
    fn test_reimport_updates_timestamp() {
        let mut store = MemoryStore::new();
        let first = pipeline().run(OBS_1, &mut store).unwrap();
        let before = store.get(&ResourceId::new("obs-1")).unwrap().imported_at;

        let second = pipeline().run(&[OBS_1, OBS_2].join("\n"), &mut store).unwrap();
        let after = store.get(&ResourceId::new("obs-1")).unwrap().imported_at;

        assert_eq!(second.persisted, UpsertStats { inserted: 1, updated: 1, skipped: 0 });
        assert_eq!(store.table().len(), 2);
        assert!(after >= before);
        assert_eq!(after, second.imported_at);
        assert_ne!(first.import_log_id, second.import_log_id);
    }

    #[test]
    fn test_reimport_with_skip_policy() {
        let config = PipelineConfig {
            duplicate_policy: DuplicatePolicy::Skip,
            ..PipelineConfig::default()
        };
        let mut store = MemoryStore::new();
        let first = ImportPipeline::new(&config).run(OBS_1, &mut store).unwrap();
        let second = ImportPipeline::new(&config).run(OBS_1, &mut store).unwrap();

        assert_eq!(second.persisted, UpsertStats { inserted: 0, updated: 0, skipped: 1 });
        assert_eq!(
            store.get(&ResourceId::new("obs-1")).unwrap().imported_at,
            first.imported_at
        );
    }

    struct FailingStore {
        inner: MemoryStore,
    }

    impl ResourceStore for FailingStore {
        fn table(&self) -> &ResourceTable {
            self.inner.table()
        }

        fn replace_table(&mut self, _table: ResourceTable) -> crate::error::Result<()> {
            Err(KilnError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
        }

        fn logs(&self) -> &[ImportLog] {
            self.inner.logs()
        }

        fn append_log(&mut self, log: ImportLog) -> crate::error::Result<()> {
            self.inner.append_log(log)
        }
    }

    #[test]
    fn test_persistence_failure_aborts_run() {
        let mut store = FailingStore { inner: MemoryStore::new() };
        let result = pipeline().run(&[OBS_1, MED_1].join("\n"), &mut store);

        assert!(matches!(result, Err(KilnError::Persistence(_))));
        assert!(store.table().is_empty());
        assert!(store.logs().is_empty());
    }

    struct LogFailingStore {
        inner: MemoryStore,
    }

    impl ResourceStore for LogFailingStore {
        fn table(&self) -> &ResourceTable {
            self.inner.table()
        }

        fn replace_table(&mut self, table: ResourceTable) -> crate::error::Result<()> {
            self.inner.replace_table(table)
        }

        fn logs(&self) -> &[ImportLog] {
            self.inner.logs()
        }

        fn append_log(&mut self, _log: ImportLog) -> crate::error::Result<()> {
            Err(KilnError::Io(std::io::Error::new(std::io::ErrorKind::Other, "log disk full")))
        }
    }

    #[test]
    fn test_log_write_failure_rolls_back_batch() {
        let mut inner = MemoryStore::new();
        pipeline().run(OBS_2, &mut inner).unwrap();
        let before = inner.table().clone();

        let mut store = LogFailingStore { inner };
        let result = pipeline().run(&[OBS_1, MED_1].join("\n"), &mut store);

        assert!(matches!(result, Err(KilnError::Persistence(_))));
        assert_eq!(store.table(), &before);
        assert_eq!(store.table().len(), 1);
        assert_eq!(store.logs().len(), 1);
    }

    #[test]
    fn test_log_write_failure_without_rows() {
        let mut store = LogFailingStore { inner: MemoryStore::new() };
        let result = pipeline().run("{not json", &mut store);

        assert!(matches!(result, Err(KilnError::Persistence(_))));
        assert!(store.table().is_empty());
    }
}
