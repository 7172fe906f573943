//! Data-quality rollups over everything imported so far
//!
//! Every call rescans the whole store; nothing is maintained incrementally.

use crate::config::{ExtractionConfig, PipelineConfig};
use crate::store::ResourceStore;
use crate::types::StoredResource;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Errors recorded by recent import runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorSummary {
    /// Number of failed lines across the summarized runs
    pub total_validation_errors: usize,
    pub errors_by_type: BTreeMap<String, usize>,
    pub recent_imports: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub total_records: usize,
    pub records_by_resource_type: BTreeMap<String, usize>,
    pub unique_subjects: usize,
    pub validation_errors: ValidationErrorSummary,

    /// `[field, count]` pairs, most frequently missing first
    pub missing_fields_top5: Vec<(String, usize)>,
}

/// Computes the analytics report
#[derive(Debug, Clone)]
pub struct AnalyticsAggregator {
    extraction: ExtractionConfig,
    recent_log_window: usize,
    top_n: usize,
}

impl AnalyticsAggregator {
    pub fn new(config: &PipelineConfig) -> Self {
        AnalyticsAggregator {
            extraction: config.extraction.clone(),
            recent_log_window: config.recent_log_window,
            top_n: config.missing_fields_top_n,
        }
    }

    pub fn summarize<S: ResourceStore + ?Sized>(&self, store: &S) -> AnalyticsReport {
        let mut records_by_resource_type = BTreeMap::new();
        let mut subjects = HashSet::new();

        for resource in store.table().iter() {
            *records_by_resource_type
                .entry(resource.resource_type.clone())
                .or_insert(0) += 1;
            if let Some(reference) = &resource.subject_reference {
                subjects.insert(reference.as_str());
            }
        }

        let report = AnalyticsReport {
            total_records: store.table().len(),
            records_by_resource_type,
            unique_subjects: subjects.len(),
            validation_errors: self.validation_summary(store),
            missing_fields_top5: self.missing_fields(store.table().iter()),
        };
        debug!(total_records = report.total_records, "analytics computed");
        report
    }

    fn validation_summary<S: ResourceStore + ?Sized>(&self, store: &S) -> ValidationErrorSummary {
        let logs = store.recent_logs(self.recent_log_window);

        let mut summary = ValidationErrorSummary {
            recent_imports: logs.len(),
            ..Default::default()
        };
        for entry in logs.iter().flat_map(|log| log.errors.iter()) {
            summary.total_validation_errors += 1;
            *summary
                .errors_by_type
                .entry(entry.kind.as_str().to_string())
                .or_insert(0) += 1;
        }
        summary
    }

    /// Count expected fields that are absent or null in each resource's extracted fields
    ///
    /// Ties keep the order in which fields were first found missing.
    pub fn missing_fields<'a>(
        &self,
        resources: impl Iterator<Item = &'a StoredResource>,
    ) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for resource in resources {
            for field in self.extraction.fields_for(&resource.resource_type) {
                let present = resource
                    .extracted_fields
                    .get(field)
                    .is_some_and(|value| !value.is_null());
                if present {
                    continue;
                }

                match positions.get(field) {
                    Some(&i) => counts[i].1 += 1,
                    None => {
                        positions.insert(field.to_string(), counts.len());
                        counts.push((field.to_string(), 1));
                    }
                }
            }
        }

        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts.truncate(self.top_n);
        counts
    }
}
