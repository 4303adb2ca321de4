// tests/templates/template_test.rs
use std::fs;

use tabula::export::{ExportRequest, FieldMapping, MultiSheetExportRequest, SheetConfiguration};
use tabula::templates::{
    ExportTemplateType, SaveTemplateRequest, TemplateConfig, TemplateError, TemplateStore,
    UpdateTemplateRequest,
};

fn single(name: &str) -> SaveTemplateRequest {
    SaveTemplateRequest {
        name: name.to_string(),
        description: "Projects with their asset".to_string(),
        export: TemplateConfig::SingleSheet(ExportRequest::new(
            "Project",
            vec![
                FieldMapping::new("Name"),
                FieldMapping::new("Asset.Name").with_column("Asset"),
                FieldMapping::new("Status").deselected(),
            ],
        )),
    }
}

fn multi(name: &str) -> SaveTemplateRequest {
    SaveTemplateRequest {
        name: name.to_string(),
        description: String::new(),
        export: TemplateConfig::MultiSheet(MultiSheetExportRequest::new(vec![
            SheetConfiguration::new("Projects", "Project", vec![FieldMapping::new("Name")]),
            SheetConfiguration::new("Defects", "Defect", vec![FieldMapping::new("Title")]),
            SheetConfiguration::new("More Projects", "projects", vec![FieldMapping::new("Id")]),
        ])),
    }
}

#[test]
fn test_missing_file_is_an_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = TemplateStore::open(dir.path().join("templates.json")).unwrap();
    assert!(store.list().is_empty());
}

#[test]
fn test_save_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("templates.json");

    let saved = {
        let mut store = TemplateStore::open(&path).unwrap();
        store.save(single("Weekly projects"), "alex").unwrap()
    };
    assert!(path.exists());

    let store = TemplateStore::open(&path).unwrap();
    let loaded = store.get(&saved.id).unwrap();
    assert_eq!(loaded, &saved);
    assert_eq!(loaded.created_by, "alex");
    assert_eq!(loaded.template_type(), ExportTemplateType::SingleSheet);
}

#[test]
fn test_blank_name_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = TemplateStore::open(dir.path().join("templates.json")).unwrap();

    let err = store.save(single("  "), "alex").unwrap_err();
    assert!(matches!(err, TemplateError::Invalid(_)));
    assert!(store.list().is_empty());
}

#[test]
fn test_summaries() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = TemplateStore::open(dir.path().join("templates.json")).unwrap();
    let one = store.save(single("Single"), "alex").unwrap();
    let many = store.save(multi("Multi"), "alex").unwrap();

    let single_summary = store.get(&one.id).unwrap().summary();
    assert_eq!(single_summary.field_count, 2);
    assert_eq!(single_summary.sheet_count, 1);
    assert_eq!(single_summary.entity_types, "Project");

    let multi_summary = store.get(&many.id).unwrap().summary();
    assert_eq!(multi_summary.template_type, ExportTemplateType::MultiSheet);
    assert_eq!(multi_summary.sheet_count, 3);
    assert_eq!(multi_summary.field_count, 3);
    assert_eq!(multi_summary.entity_types, "Project, Defect");

    assert_eq!(store.summaries().len(), 2);
    assert_eq!(store.by_type(ExportTemplateType::MultiSheet).len(), 1);
}

#[test]
fn test_update_keeps_export_when_omitted() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = TemplateStore::open(dir.path().join("templates.json")).unwrap();
    let saved = store.save(single("Weekly"), "alex").unwrap();

    let updated = store
        .update(UpdateTemplateRequest {
            id: saved.id.clone(),
            name: "Monthly".to_string(),
            description: "Renamed".to_string(),
            export: None,
        })
        .unwrap();

    assert_eq!(updated.name, "Monthly");
    assert_eq!(updated.export, saved.export);
    assert_eq!(updated.created_at, saved.created_at);
    assert!(updated.updated_at >= saved.updated_at);
}

#[test]
fn test_update_unknown_id() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = TemplateStore::open(dir.path().join("templates.json")).unwrap();

    let err = store
        .update(UpdateTemplateRequest {
            id: "missing".to_string(),
            name: "Anything".to_string(),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, TemplateError::NotFound(id) if id == "missing"));
}

#[test]
fn test_delete() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("templates.json");
    let mut store = TemplateStore::open(&path).unwrap();
    let saved = store.save(single("Weekly"), "alex").unwrap();

    assert!(store.delete(&saved.id).unwrap());
    assert!(!store.delete(&saved.id).unwrap());
    assert!(TemplateStore::open(&path).unwrap().list().is_empty());
}

#[test]
fn test_search_is_case_insensitive() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = TemplateStore::open(dir.path().join("templates.json")).unwrap();
    store.save(single("Weekly projects"), "alex").unwrap();
    store.save(multi("Defect workbook"), "alex").unwrap();

    let hits: Vec<&str> = store.search("WEEKLY").iter().map(|t| t.name.as_str()).collect();
    assert_eq!(hits, ["Weekly projects"]);
    // Description match
    assert_eq!(store.search("their asset").len(), 1);
    assert!(store.search("nothing").is_empty());
}

#[test]
fn test_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = TemplateStore::open(dir.path().join("templates.json")).unwrap();
    let saved = store.save(multi("Workbook"), "alex").unwrap();

    let copy = store.duplicate(&saved.id, "sam").unwrap();

    assert_ne!(copy.id, saved.id);
    assert_eq!(copy.name, "Workbook (Copy)");
    assert_eq!(copy.created_by, "sam");
    assert_eq!(copy.export, saved.export);
    assert_eq!(store.list().len(), 2);
    assert!(matches!(
        store.duplicate("missing", "sam"),
        Err(TemplateError::NotFound(_))
    ));
}

#[test]
fn test_corrupt_file_starts_empty_and_is_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("templates.json");
    fs::write(&path, "{ not json").unwrap();

    let mut store = TemplateStore::open(&path).unwrap();
    assert!(store.list().is_empty());

    store.save(single("Fresh"), "alex").unwrap();
    let reopened = TemplateStore::open(&path).unwrap();
    assert_eq!(reopened.list().len(), 1);
}

#[test]
fn test_stored_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("templates.json");
    let mut store = TemplateStore::open(&path).unwrap();
    store.save(single("Weekly"), "alex").unwrap();

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json[0]["export"]["type"], "single_sheet");
    assert_eq!(json[0]["export"]["entity_type"], "Project");
    assert_eq!(json[0]["export"]["mappings"][1]["output_column"], "Asset");
}

#[test]
fn test_failed_write_leaves_store_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("templates.json");
    let mut store = TemplateStore::open(&path).unwrap();
    let kept = store.save(single("Weekly"), "alex").unwrap();

    // A directory where the staging file goes makes every write fail
    fs::create_dir(dir.path().join("templates.json.tmp")).unwrap();

    let err = store.save(multi("Workbook"), "alex").unwrap_err();
    assert!(matches!(err, TemplateError::Io { .. }));
    assert_eq!(store.list().len(), 1);

    assert!(store.delete(&kept.id).is_err());
    assert!(store.get(&kept.id).is_some());

    let renamed = UpdateTemplateRequest {
        id: kept.id.clone(),
        name: "Monthly".to_string(),
        ..Default::default()
    };
    assert!(store.update(renamed).is_err());
    assert_eq!(store.get(&kept.id).unwrap().name, "Weekly");

    let reopened = TemplateStore::open(&path).unwrap();
    assert_eq!(reopened.list().len(), 1);
}
