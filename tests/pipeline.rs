use kiln::query::{get_record, list_records, transform_records};
use kiln::types::ErrorKind;
use kiln::{
    AnalyticsAggregator, DirStore, DuplicatePolicy, ImportPipeline, PipelineConfig,
    ResourceFilter, ResourceId, ResourceStore, TransformEngine,
};
use serde_json::{json, Value};

const BATCH: &str = r#"{"id": "obs-1", "resourceType": "Observation", "status": "final", "subject": {"reference": "Patient/PT-001"}, "code": {"text": "Heart rate", "coding": [{"system": "http://loinc.org", "code": "8867-4"}]}, "valueQuantity": {"value": 72, "unit": "bpm"}, "effectiveDateTime": "2024-03-01T10:00:00Z"}
{"id": "med-1", "resourceType": "MedicationRequest", "status": "active", "subject": {"reference": "Patient/PT-002"}, "medicationCodeableConcept": {"text": "Metformin"}}

{"id": "obs-2", "resourceType": "Observation", "status": "registered", "subject": {"reference": "Patient/PT-001"}, "code": {"text": "Heart rate"}}
{"id": "cond-1", "resourceType": "Condition", "subject": {"reference": "Patient/PT-001"}}
not json at all
{"id": "proc-1", "resourceType": "Procedure", "status": "completed", "subject": {"reference": "Patient/PT-003"}, "code": {"text": "Appendectomy"}}
"#;

#[test]
fn test_import_query_and_report_through_directory_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::default();

    let summary = {
        let mut store = DirStore::open(dir.path()).unwrap();
        ImportPipeline::new(&config).run(BATCH, &mut store).unwrap()
    };

    assert_eq!(summary.total_lines, 6);
    assert_eq!(summary.successful_imports, 3);
    assert_eq!(summary.failed_imports, 3);
    assert_eq!(
        summary.successful_imports + summary.failed_imports,
        summary.total_lines
    );

    let lines: Vec<_> = summary
        .validation_errors
        .iter()
        .map(|e| (e.line_number, e.kind))
        .collect();
    assert_eq!(
        lines,
        vec![
            (4, ErrorKind::ValidationError),
            (5, ErrorKind::ValidationError),
            (6, ErrorKind::ParseError),
        ]
    );
    assert_eq!(
        summary.validation_errors[0].errors,
        vec!["Line 4: Invalid status 'registered' for Observation".to_string()]
    );
    assert_eq!(
        summary.validation_errors[1].errors,
        vec!["Line 5: Condition missing required field 'code'".to_string()]
    );
    assert_eq!(summary.statistics.unique_patients, 3);

    // everything survives a reopen
    let store = DirStore::open(dir.path()).unwrap();
    assert_eq!(store.table().len(), 3);
    assert_eq!(store.logs().len(), 1);
    assert_eq!(store.logs()[0].id, summary.import_log_id);

    let obs = store.get(&ResourceId::new("obs-1")).unwrap();
    assert_eq!(obs.subject_reference.as_deref(), Some("Patient/PT-001"));
    assert_eq!(obs.extracted_fields["valueQuantity"]["value"], 72);

    let filter = ResourceFilter {
        resource_type: None,
        subject: Some("PT-001".into()),
    };
    let listed = list_records(&store, &filter, None);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], "obs-1");

    let fields = vec!["code.coding[0].code".to_string()];
    let raw = get_record(&store, "obs-1", Some(fields.as_slice())).unwrap();
    assert_eq!(
        Value::Object(raw),
        json!({"code.coding[0].code": "8867-4", "id": "obs-1"})
    );

    let engine = TransformEngine::from_json_str(
        r#"[{"action": "flatten", "field": "code.coding[0]"}, {"action": "extract", "field": "valueQuantity.value", "as": "value"}]"#,
    )
    .unwrap();
    let transformed = transform_records(
        &store,
        &ResourceFilter {
            resource_type: Some("Observation".into()),
            subject: None,
        },
        &engine,
    );
    assert_eq!(
        Value::Object(transformed[0].clone()),
        json!({
            "id": "obs-1",
            "resourceType": "Observation",
            "code_system": "http://loinc.org",
            "code_code": "8867-4",
            "value": 72
        })
    );

    let report = AnalyticsAggregator::new(&config).summarize(&store);
    assert_eq!(report.total_records, 3);
    assert_eq!(report.unique_subjects, 3);
    assert_eq!(report.validation_errors.recent_imports, 1);
    assert_eq!(report.validation_errors.total_validation_errors, 3);
    assert_eq!(report.validation_errors.errors_by_type["validation_error"], 2);
    assert_eq!(report.validation_errors.errors_by_type["parse_error"], 1);
}

#[test]
fn test_reimport_respects_duplicate_policy() {
    let dir = tempfile::tempdir().unwrap();
    let first = r#"{"id": "c-1", "resourceType": "Condition", "subject": {"reference": "Patient/1"}, "code": {"text": "Asthma"}}"#;
    let second = r#"{"id": "c-1", "resourceType": "Condition", "subject": {"reference": "Patient/1"}, "code": {"text": "Asthma, resolved"}}"#;

    {
        let mut store = DirStore::open(dir.path()).unwrap();
        ImportPipeline::new(&PipelineConfig::default())
            .run(first, &mut store)
            .unwrap();
    }

    let skip = PipelineConfig {
        duplicate_policy: DuplicatePolicy::Skip,
        ..PipelineConfig::default()
    };
    {
        let mut store = DirStore::open(dir.path()).unwrap();
        let summary = ImportPipeline::new(&skip).run(second, &mut store).unwrap();
        assert_eq!(summary.persisted.skipped, 1);
    }
    let store = DirStore::open(dir.path()).unwrap();
    assert_eq!(
        store.get(&ResourceId::new("c-1")).unwrap().raw_data["code"]["text"],
        "Asthma"
    );
    drop(store);

    {
        let mut store = DirStore::open(dir.path()).unwrap();
        let summary = ImportPipeline::new(&PipelineConfig::default())
            .run(second, &mut store)
            .unwrap();
        assert_eq!(summary.persisted.updated, 1);
    }
    let store = DirStore::open(dir.path()).unwrap();
    assert_eq!(store.table().len(), 1);
    assert_eq!(store.logs().len(), 3);
    assert_eq!(
        store.get(&ResourceId::new("c-1")).unwrap().raw_data["code"]["text"],
        "Asthma, resolved"
    );
}
