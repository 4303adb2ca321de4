// tests/resolve/resolver_test.rs
use std::collections::HashMap;
use std::sync::Arc;

use tabula::catalog::RelationshipDefinition;
use tabula::resolve::{required_related_entities, FieldResolver};
use tabula::{EntityType, Record, RelationshipCatalog, Value};

fn pump_fixture() -> HashMap<EntityType, Vec<Record>> {
    HashMap::from([
        (
            EntityType::PROJECT,
            vec![
                Record::new()
                    .with("Id", "P1")
                    .with("Name", "Q1 Inspection")
                    .with("AssetId", "A9")
                    .with("Meta", Record::new().with("Region", "North")),
                Record::new()
                    .with("Id", "P2")
                    .with("Name", "Q2 Inspection")
                    .with("AssetId", "A404"),
            ],
        ),
        (
            EntityType::ASSET,
            vec![
                Record::new()
                    .with("Id", "A9")
                    .with("Name", "Pump")
                    .with("Location", Record::new().with("Site", "Plant 3")),
                Record::new().with("Id", "A10").with("Name", "Valve"),
            ],
        ),
    ])
}

fn resolver() -> FieldResolver {
    FieldResolver::build(pump_fixture(), Arc::new(RelationshipCatalog::standard()))
}

#[test]
fn test_project_resolves_asset_name() {
    let resolver = resolver();
    let projects = resolver.cache().records(&EntityType::PROJECT);

    assert_eq!(
        resolver.resolve(&projects[0], "Asset.Name", &EntityType::PROJECT),
        Some(Value::from("Pump"))
    );
    assert_eq!(
        resolver.resolve_cell(&projects[0], "Asset.Location.Site", &EntityType::PROJECT),
        "Plant 3"
    );
}

#[test]
fn test_dangling_foreign_key_is_empty_cell() {
    let resolver = resolver();
    let projects = resolver.cache().records(&EntityType::PROJECT);

    assert_eq!(resolver.resolve(&projects[1], "Asset.Name", &EntityType::PROJECT), None);
    assert_eq!(resolver.resolve_cell(&projects[1], "Asset.Name", &EntityType::PROJECT), "");
}

#[test]
fn test_unqualified_paths_match_direct_lookup() {
    let resolver = resolver();
    let paths = ["Id", "Name", "AssetId", "Meta.Region", "Meta.Missing", "Nope"];

    for project in resolver.cache().records(&EntityType::PROJECT) {
        for path in paths {
            assert_eq!(
                resolver.resolve(project, path, &EntityType::PROJECT),
                project.lookup(path).cloned(),
                "path {path}"
            );
        }
    }
}

#[test]
fn test_unknown_prefix_is_a_direct_lookup() {
    let resolver = resolver();
    let project = &resolver.cache().records(&EntityType::PROJECT)[0];

    // Not an entity type, so it reads a nested field that does not exist
    assert_eq!(resolver.resolve(project, "Bogus.Name", &EntityType::PROJECT), None);
    assert_eq!(
        resolver.resolve(project, "Meta.Region", &EntityType::PROJECT),
        Some(Value::from("North"))
    );
}

#[test]
fn test_unrelated_entity_type_resolves_to_none() {
    let resolver = resolver();
    let project = &resolver.cache().records(&EntityType::PROJECT)[0];

    // Project has no relationship to Library
    assert_eq!(resolver.resolve(project, "Library.Name", &EntityType::PROJECT), None);
    // Project → Defect is a collection
    assert_eq!(resolver.resolve(project, "Defect.Title", &EntityType::PROJECT), None);
}

#[test]
fn test_only_one_hop_is_followed() {
    let catalog = RelationshipCatalog::standard();
    let resolver = FieldResolver::build(
        HashMap::from([
            (
                EntityType::DEFECT,
                vec![Record::new().with("Id", "D1").with("ProjectId", "P1")],
            ),
            (
                EntityType::PROJECT,
                vec![Record::new().with("Id", "P1").with("AssetId", "A1").with("Name", "Q1")],
            ),
            (
                EntityType::ASSET,
                vec![Record::new().with("Id", "A1").with("Name", "Pump")],
            ),
        ]),
        Arc::new(catalog),
    );
    let defect = &resolver.cache().records(&EntityType::DEFECT)[0];

    assert_eq!(
        resolver.resolve(defect, "Project.Name", &EntityType::DEFECT),
        Some(Value::from("Q1"))
    );
    assert_eq!(resolver.resolve(defect, "Project.Asset.Name", &EntityType::DEFECT), None);
}

#[test]
fn test_custom_relationship_and_key() {
    let catalog = RelationshipCatalog::builder()
        .relate(
            EntityType::PROJECT,
            RelationshipDefinition::one(EntityType::ASSET, "AssetTag", "ExternalId", "Asset by tag"),
        )
        .build();
    let resolver = FieldResolver::build(
        HashMap::from([(
            EntityType::ASSET,
            vec![Record::new().with("Id", "A1").with("ExternalId", 77_i64).with("Name", "Pump")],
        )]),
        Arc::new(catalog),
    );
    let project = Record::new().with("Id", "P1").with("AssetTag", "77");

    assert_eq!(
        resolver.resolve_cell(&project, "Asset.Name", &EntityType::PROJECT),
        "Pump"
    );
}

#[test]
fn test_required_related_entities() {
    let catalog = RelationshipCatalog::standard();
    let mappings = [
        tabula::export::FieldMapping::new("Name"),
        tabula::export::FieldMapping::new("Asset.Name"),
        tabula::export::FieldMapping::new("Bogus.Name"),
        tabula::export::FieldMapping::new("Defect.Title"),
        tabula::export::FieldMapping::new("Asset.Location").deselected(),
    ];

    let required = required_related_entities(&catalog, &EntityType::PROJECT, &mappings);
    assert!(required.contains(&EntityType::ASSET));
    assert!(!required.contains(&EntityType::PROJECT));
    assert!(!required.contains(&EntityType::new("Bogus")));
}
