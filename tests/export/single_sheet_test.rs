// tests/export/single_sheet_test.rs
use std::sync::Arc;

use serde_json::json;
use tabula::export::{ExportError, ExportPlanner, ExportRequest, FieldMapping, SheetConfiguration};
use tabula::fetch::InMemoryFetcher;
use tabula::writer::sheet_to_csv;
use tabula::{EntityType, RelationshipCatalog};

/// Fixture shaped like the backend's snake_case payloads.
fn fixture() -> InMemoryFetcher {
    InMemoryFetcher::from_json(json!({
        "projects": [
            { "id": "P1", "name": "Q1 Inspection", "asset_id": "A9",
              "meta": { "region": "North" } },
            { "id": "P2", "name": "Q2 Inspection", "asset_id": "A404" }
        ],
        "assets": [
            { "id": "A9", "name": "Pump", "status": "Active" }
        ]
    }))
    .unwrap()
}

fn planner(fetcher: Arc<InMemoryFetcher>) -> ExportPlanner {
    ExportPlanner::new(fetcher, Arc::new(RelationshipCatalog::standard()))
}

fn project_request() -> SheetConfiguration {
    SheetConfiguration::from(ExportRequest::new(
        "project",
        vec![
            FieldMapping::new("Name").with_column("Project"),
            FieldMapping::new("Asset.Name").with_column("Asset"),
            FieldMapping::new("Meta.Region"),
            FieldMapping::new("Asset.Status").deselected(),
        ],
    ))
}

#[tokio::test]
async fn test_project_sheet_with_asset_names() {
    let fetcher = Arc::new(fixture());
    let sheet = planner(fetcher.clone())
        .plan_single_sheet(&project_request())
        .await
        .unwrap();

    assert_eq!(sheet.name, "Project");
    assert_eq!(sheet.entity_type, EntityType::PROJECT);
    assert_eq!(sheet.headers, ["Project", "Asset", "Meta.Region"]);
    assert_eq!(sheet.column("Asset"), Some(vec!["Pump", ""]));
    assert_eq!(sheet.column("Meta.Region"), Some(vec!["North", ""]));

    assert_eq!(fetcher.fetch_all_calls(&EntityType::PROJECT), 1);
    assert_eq!(fetcher.fetch_all_calls(&EntityType::ASSET), 1);
}

#[tokio::test]
async fn test_sheet_renders_as_csv() {
    let sheet = planner(Arc::new(fixture()))
        .plan_single_sheet(&project_request())
        .await
        .unwrap();

    insta::assert_snapshot!(sheet_to_csv(&sheet).unwrap().trim_end(), @r"
    Project,Asset,Meta.Region
    Q1 Inspection,Pump,North
    Q2 Inspection,,
    ");
}

#[tokio::test]
async fn test_direct_only_mappings_fetch_only_the_root() {
    let fetcher = Arc::new(fixture());
    let config = SheetConfiguration::new("Projects", "Project", vec![FieldMapping::new("Id")]);

    let sheet = planner(fetcher.clone()).plan_single_sheet(&config).await.unwrap();

    assert_eq!(sheet.name, "Projects");
    assert_eq!(sheet.row_count(), 2);
    assert_eq!(fetcher.fetch_all_calls(&EntityType::ASSET), 0);
}

#[tokio::test]
async fn test_unknown_prefix_yields_empty_column() {
    let fetcher = Arc::new(fixture());
    let config = SheetConfiguration::new(
        "Projects",
        "Project",
        vec![FieldMapping::new("Name"), FieldMapping::new("Library.Name")],
    );

    let sheet = planner(fetcher.clone()).plan_single_sheet(&config).await.unwrap();

    assert_eq!(sheet.column("Library.Name"), Some(vec!["", ""]));
    assert_eq!(fetcher.fetch_all_calls(&EntityType::LIBRARY), 0);
}

#[tokio::test]
async fn test_no_records_is_no_data() {
    let config = SheetConfiguration::new("Defects", "Defect", vec![FieldMapping::new("Title")]);

    let err = planner(Arc::new(fixture()))
        .plan_single_sheet(&config)
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::NoData { ref entity_type } if *entity_type == EntityType::DEFECT));
    assert!(err.is_empty_result());
}

#[tokio::test]
async fn test_nothing_selected_is_invalid() {
    let config = SheetConfiguration::new(
        "Projects",
        "Project",
        vec![FieldMapping::new("Name").deselected()],
    );

    let err = planner(Arc::new(fixture()))
        .plan_single_sheet(&config)
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_fetch_failure_names_the_type() {
    let fetcher = Arc::new(fixture().failing_all(EntityType::ASSET));

    let err = planner(fetcher)
        .plan_single_sheet(&project_request())
        .await
        .unwrap_err();

    match err {
        ExportError::Fetch { entity_type, .. } => assert_eq!(entity_type, EntityType::ASSET),
        other => panic!("expected a fetch error, got {other:?}"),
    }
}
