//! Reading stored resources back out, shaped for the caller

use crate::error::{KilnError, Result};
use crate::project::project;
use crate::store::{ResourceFilter, ResourceStore};
use crate::transform::TransformEngine;
use crate::types::{Record, ResourceId};
use serde_json::Value;

/// List resources matching `filter`, projecting their extracted fields
pub fn list_records<S: ResourceStore + ?Sized>(
    store: &S,
    filter: &ResourceFilter,
    fields: Option<&[String]>,
) -> Vec<Record> {
    store
        .find(filter)
        .into_iter()
        .map(|resource| project(&resource.extracted_fields, fields))
        .collect()
}

/// Fetch one resource by identifier, projecting its raw record
///
/// The result always carries an `id`, even when the projection left it out.
pub fn get_record<S: ResourceStore + ?Sized>(
    store: &S,
    id: &str,
    fields: Option<&[String]>,
) -> Result<Record> {
    let resource = store
        .get(&ResourceId::new(id))
        .ok_or_else(|| KilnError::NotFound(id.to_string()))?;

    let mut result = project(&resource.raw_data, fields);
    if !result.contains_key("id") {
        let id = resource
            .raw_data
            .get("id")
            .cloned()
            .unwrap_or_else(|| Value::String(resource.id.to_string()));
        result.insert("id".to_string(), id);
    }
    Ok(result)
}

/// Apply transformation rules to the raw records matching `filter`
pub fn transform_records<S: ResourceStore + ?Sized>(
    store: &S,
    filter: &ResourceFilter,
    engine: &TransformEngine,
) -> Vec<Record> {
    let raw: Vec<Record> = store
        .find(filter)
        .into_iter()
        .map(|resource| resource.raw_data.clone())
        .collect();
    engine.apply(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::import::ImportPipeline;
    use crate::store::MemoryStore;
    use crate::transform::TransformRule;
    use serde_json::json;

    fn seeded_store() -> MemoryStore {
        let content = [
            r#"{"id": "obs-1", "resourceType": "Observation", "status": "final", "subject": {"reference": "Patient/PT-001"}, "code": {"text": "Heart rate"}, "valueQuantity": {"value": 72}, "meta": {"source": "x"}}"#,
            r#"{"id": "obs-2", "resourceType": "Observation", "status": "final", "subject": {"reference": "Patient/PT-002"}, "code": {"text": "Heart rate"}, "valueQuantity": {"value": 80}}"#,
            r#"{"id": "cond-1", "resourceType": "Condition", "subject": {"reference": "Patient/PT-001"}, "code": {"text": "Asthma"}}"#,
        ]
        .join("\n");

        let mut store = MemoryStore::new();
        ImportPipeline::new(&PipelineConfig::default())
            .run(&content, &mut store)
            .unwrap();
        store
    }

    #[test]
    fn test_list_by_bare_subject() {
        let store = seeded_store();
        let filter = ResourceFilter {
            resource_type: None,
            subject: Some("PT-001".into()),
        };
        let fields = vec!["id".to_string()];

        let records = list_records(&store, &filter, Some(fields.as_slice()));
        assert_eq!(
            records.into_iter().map(Value::Object).collect::<Vec<_>>(),
            vec![json!({"id": "obs-1"}), json!({"id": "cond-1"})]
        );
    }

    #[test]
    fn test_list_uses_extracted_fields() {
        let store = seeded_store();
        let filter = ResourceFilter {
            resource_type: Some("Observation".into()),
            subject: None,
        };

        let records = list_records(&store, &filter, None);
        assert_eq!(records.len(), 2);
        assert!(records[0].contains_key("subject_reference"));
        assert!(!records[0].contains_key("meta"));
    }

    #[test]
    fn test_get_record_projects_raw_and_keeps_id() {
        let store = seeded_store();
        let fields = vec!["meta.source".to_string()];

        let record = get_record(&store, "obs-1", Some(fields.as_slice())).unwrap();
        assert_eq!(Value::Object(record), json!({"meta.source": "x", "id": "obs-1"}));

        let full = get_record(&store, "obs-1", None).unwrap();
        assert_eq!(full["meta"]["source"], "x");
    }

    #[test]
    fn test_get_record_not_found() {
        let store = seeded_store();
        assert!(matches!(
            get_record(&store, "nope", None),
            Err(KilnError::NotFound(_))
        ));
    }

    #[test]
    fn test_transform_filtered_records() {
        let store = seeded_store();
        let engine = TransformEngine::new(vec![TransformRule::extract("valueQuantity.value", Some("value"))]);
        let filter = ResourceFilter {
            resource_type: Some("Observation".into()),
            subject: None,
        };

        let out = transform_records(&store, &filter, &engine);
        assert_eq!(out.len(), 2);
        assert_eq!(out[1]["value"], 80);
        assert_eq!(out[1]["resourceType"], "Observation");
    }
}
