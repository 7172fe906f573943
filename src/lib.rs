//! # Kiln - Clinical Record Import and Analytics
//!
//! Ingests newline-delimited clinical resources (FHIR-style JSON), validates
//! them against per-type rules, keeps a configured subset of fields, and
//! serves them back through projections, transformation rules and
//! data-quality rollups.
//!
//! ## Modules
//!
//! - **path**: dotted/bracketed field paths (`component[0].valueQuantity.value`)
//! - **validate**: required-field and status rules per resource type
//! - **extract**: the canonical extracted-field subset of a record
//! - **project**: caller-chosen field projections
//! - **transform**: `flatten` / `extract` transformation rules
//! - **import**: line-by-line import runs with error accounting
//! - **store**: resource and import-log storage, duplicate reconciliation
//! - **analytics**: counts, validation-error history, missing-field ranking
//!
//! ## Quick Start
//!
//! ```rust
//! use kiln::{AnalyticsAggregator, ImportPipeline, MemoryStore, PipelineConfig};
//!
//! # fn main() -> kiln::Result<()> {
//! let content = r#"{"id": "obs-1", "resourceType": "Observation", "status": "final", "subject": {"reference": "Patient/PT-001"}, "code": {"text": "Heart rate"}}
//! {not json}"#;
//!
//! let config = PipelineConfig::default();
//! let mut store = MemoryStore::new();
//! let summary = ImportPipeline::new(&config).run(content, &mut store)?;
//!
//! assert_eq!(summary.successful_imports, 1);
//! assert_eq!(summary.failed_imports, 1);
//!
//! let report = AnalyticsAggregator::new(&config).summarize(&store);
//! assert_eq!(report.records_by_resource_type["Observation"], 1);
//! # Ok(())
//! # }
//! ```
//!
//! ### Projection and transformation
//!
//! ```rust
//! use kiln::transform::{TransformEngine, TransformRule};
//! use kiln::{project, Record};
//! use serde_json::json;
//!
//! let record: Record = serde_json::from_value(json!({
//!     "id": "obs-1",
//!     "resourceType": "Observation",
//!     "code": {"text": "Heart rate", "coding": [{"system": "http://loinc.org", "code": "8867-4"}]},
//!     "valueQuantity": {"value": 72}
//! })).unwrap();
//!
//! let fields = vec!["code.text".to_string()];
//! assert_eq!(project(&record, Some(fields.as_slice()))["code.text"], "Heart rate");
//!
//! let engine = TransformEngine::new(vec![
//!     TransformRule::flatten("code.coding[0]"),
//!     TransformRule::extract("valueQuantity.value", Some("value")),
//! ]);
//! let out = engine.apply_one(&record);
//! assert_eq!(out["code_code"], "8867-4");
//! assert_eq!(out["value"], 72);
//! ```

use std::io::Read;

pub mod analytics;
pub mod config;
pub mod error;
pub mod extract;
pub mod import;
pub mod path;
pub mod project;
pub mod query;
pub mod store;
pub mod transform;
pub mod types;
pub mod validate;

// Re-export commonly used types for convenience
pub use analytics::{AnalyticsAggregator, AnalyticsReport};
pub use config::{DuplicatePolicy, ExtractionConfig, PipelineConfig, ValidationConfig};
pub use error::{KilnError, ProcessingError, Result};
pub use extract::Extractor;
pub use import::ImportPipeline;
pub use path::{resolve, FieldPath};
pub use project::project;
pub use store::{DirStore, MemoryStore, Reconciler, ResourceFilter, ResourceStore};
pub use transform::{TransformEngine, TransformRule};
pub use types::{ImportLog, ImportSummary, Record, ResourceId, StoredResource};
pub use validate::Validator;

/// Main entry point: import newline-delimited JSON from a reader into a store
pub fn import_ndjson<R: Read, S: ResourceStore + ?Sized>(
    mut reader: R,
    store: &mut S,
    config: &PipelineConfig,
) -> Result<ImportSummary> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;
    ImportPipeline::new(config).run(&content, store)
}
