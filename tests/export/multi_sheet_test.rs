// tests/export/multi_sheet_test.rs
use std::sync::Arc;

use tabula::export::{
    ExportError, ExportPlanner, FieldMapping, MultiSheetExportRequest, SheetConfiguration,
};
use tabula::fetch::InMemoryFetcher;
use tabula::{EntityType, Record, RelationshipCatalog};

fn fetcher() -> InMemoryFetcher {
    InMemoryFetcher::new()
        .with_records(
            EntityType::PROJECT,
            vec![
                Record::new().with("Id", "P1").with("Name", "Q1").with("AssetId", "A1"),
                Record::new().with("Id", "P2").with("Name", "Q2").with("AssetId", "A2"),
            ],
        )
        .with_records(
            EntityType::ASSET,
            vec![
                Record::new().with("Id", "A1").with("Name", "Pump"),
                Record::new().with("Id", "A2").with("Name", "Valve"),
            ],
        )
        .with_records(
            EntityType::DEFECT,
            vec![
                Record::new()
                    .with("Id", "D1")
                    .with("ProjectId", "P1")
                    .with("AssetId", "A1")
                    .with("Title", "Crack"),
                Record::new()
                    .with("Id", "D2")
                    .with("ProjectId", "P2")
                    .with("AssetId", "A2")
                    .with("Title", "Rust"),
                Record::new()
                    .with("Id", "D3")
                    .with("ProjectId", "P1")
                    .with("AssetId", "A1")
                    .with("Title", "Leak"),
            ],
        )
}

fn planner(fetcher: Arc<InMemoryFetcher>) -> ExportPlanner {
    ExportPlanner::new(fetcher, Arc::new(RelationshipCatalog::standard()))
}

fn three_sheets() -> Vec<SheetConfiguration> {
    vec![
        SheetConfiguration::new(
            "Projects",
            "Project",
            vec![FieldMapping::new("Name"), FieldMapping::new("Asset.Name").with_column("Asset")],
        ),
        SheetConfiguration::new(
            "P1 Defects",
            "Defect",
            vec![
                FieldMapping::new("Title"),
                FieldMapping::new("Project.Name").with_column("Project"),
                FieldMapping::new("Asset.Name").with_column("Asset"),
            ],
        )
        .filtered_by("Project", "P1"),
        SheetConfiguration::new("Assets", "Asset", vec![FieldMapping::new("Name")]),
    ]
}

#[tokio::test]
async fn test_linked_workbook_fetches_each_type_once() {
    let fetcher = Arc::new(fetcher());
    let request = MultiSheetExportRequest::new(three_sheets());

    let workbook = planner(fetcher.clone()).plan_multi_sheet(&request).await.unwrap();

    assert_eq!(workbook.len(), 3);
    for entity_type in [EntityType::PROJECT, EntityType::ASSET, EntityType::DEFECT] {
        assert_eq!(fetcher.fetch_all_calls(&entity_type), 1, "{entity_type}");
    }
    assert_eq!(fetcher.total_calls(), 3);
}

#[tokio::test]
async fn test_parent_filter_keeps_matching_children() {
    let request = MultiSheetExportRequest::new(three_sheets());

    let workbook = planner(Arc::new(fetcher())).plan_multi_sheet(&request).await.unwrap();

    let defects = workbook.sheet("P1 Defects").unwrap();
    assert_eq!(defects.column("Title"), Some(vec!["Crack", "Leak"]));
    assert_eq!(defects.column("Project"), Some(vec!["Q1", "Q1"]));
    assert_eq!(defects.column("Asset"), Some(vec!["Pump", "Pump"]));

    let projects = workbook.sheet("Projects").unwrap();
    assert_eq!(projects.column("Asset"), Some(vec!["Pump", "Valve"]));
}

#[tokio::test]
async fn test_unlinked_workbook_fetches_per_sheet() {
    let fetcher = Arc::new(fetcher());
    let request = MultiSheetExportRequest::new(three_sheets()).unlinked();

    let workbook = planner(fetcher.clone()).plan_multi_sheet(&request).await.unwrap();

    assert_eq!(workbook.len(), 3);
    // Projects and Defects sheets both join to Asset, then the Assets sheet
    assert_eq!(fetcher.fetch_all_calls(&EntityType::ASSET), 3);
    assert_eq!(fetcher.fetch_all_calls(&EntityType::PROJECT), 2);
    assert_eq!(fetcher.fetch_all_calls(&EntityType::DEFECT), 1);
    assert_eq!(
        workbook.sheet("P1 Defects").unwrap().column("Title"),
        Some(vec!["Crack", "Leak"])
    );
}

#[tokio::test]
async fn test_empty_sheets_are_skipped() {
    let sheets = vec![
        SheetConfiguration::new("Projects", "Project", vec![FieldMapping::new("Name")]),
        SheetConfiguration::new("Tasks", "Task", vec![FieldMapping::new("Title")]),
        SheetConfiguration::new("P9 Defects", "Defect", vec![FieldMapping::new("Title")])
            .filtered_by("Project", "P9"),
    ];

    let workbook = planner(Arc::new(fetcher()))
        .plan_multi_sheet(&MultiSheetExportRequest::new(sheets))
        .await
        .unwrap();

    let names: Vec<&str> = workbook.sheets.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["Projects"]);
}

#[tokio::test]
async fn test_all_sheets_empty_is_empty_workbook() {
    let sheets = vec![
        SheetConfiguration::new("Tasks", "Task", vec![FieldMapping::new("Title")]),
        SheetConfiguration::new("Users", "User", vec![FieldMapping::new("Email")]),
    ];

    let err = planner(Arc::new(fetcher()))
        .plan_multi_sheet(&MultiSheetExportRequest::new(sheets))
        .await
        .unwrap_err();

    assert!(matches!(err, ExportError::EmptyWorkbook));
    assert!(err.is_empty_result());
}

#[tokio::test]
async fn test_parent_without_relationship_has_no_rows() {
    // Asset has no relationship to Checklist
    let sheets = vec![
        SheetConfiguration::new("Projects", "Project", vec![FieldMapping::new("Name")]),
        SheetConfiguration::new("Assets", "Asset", vec![FieldMapping::new("Name")])
            .filtered_by("Checklist", "C1"),
    ];

    let workbook = planner(Arc::new(fetcher()))
        .plan_multi_sheet(&MultiSheetExportRequest::new(sheets))
        .await
        .unwrap();

    assert_eq!(workbook.len(), 1);
    assert!(workbook.sheet("Assets").is_none());
}

#[tokio::test]
async fn test_start_row_and_sheet_name_fallback() {
    let sheets = vec![
        SheetConfiguration::new("", "assets", vec![FieldMapping::new("Name")]).starting_at(4),
        SheetConfiguration::new("Projects", "Project", vec![FieldMapping::new("Name")]).starting_at(0),
    ];

    let workbook = planner(Arc::new(fetcher()))
        .plan_multi_sheet(&MultiSheetExportRequest::new(sheets))
        .await
        .unwrap();

    assert_eq!(workbook.sheets[0].name, "Asset");
    assert_eq!(workbook.sheets[0].start_row, 4);
    assert_eq!(workbook.sheets[1].start_row, 1);
}

#[tokio::test]
async fn test_duplicate_sheet_names_are_suffixed() {
    let sheets = vec![
        SheetConfiguration::new("Data", "Project", vec![FieldMapping::new("Name")]),
        SheetConfiguration::new("data", "Asset", vec![FieldMapping::new("Name")]),
        SheetConfiguration::new("Data", "Defect", vec![FieldMapping::new("Title")]),
    ];

    let workbook = planner(Arc::new(fetcher()))
        .plan_multi_sheet(&MultiSheetExportRequest::new(sheets))
        .await
        .unwrap();

    let names: Vec<&str> = workbook.sheets.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["Data", "data (2)", "Data (3)"]);
}

#[tokio::test]
async fn test_request_from_json() {
    let request: MultiSheetExportRequest = serde_json::from_value(serde_json::json!({
        "sheets": [{
            "sheetName": "Defects",
            "entityType": "defects",
            "mappings": [
                { "apiField": "Title", "excelColumn": "Defect" },
                { "apiField": "Project.Name", "excelColumn": "Project" }
            ]
        }]
    }))
    .unwrap();

    let workbook = planner(Arc::new(fetcher())).plan_multi_sheet(&request).await.unwrap();

    let sheet = workbook.sheet("Defects").unwrap();
    assert_eq!(sheet.headers, ["Defect", "Project"]);
    assert_eq!(sheet.column("Project"), Some(vec!["Q1", "Q2", "Q1"]));
}

#[tokio::test]
async fn test_no_sheets_is_invalid() {
    let err = planner(Arc::new(fetcher()))
        .plan_multi_sheet(&MultiSheetExportRequest::new(Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::InvalidRequest(_)));
}
