//! Relationship catalog.
//!
//! A static table mapping each entity type to its declared relationships.
//! The catalog is configuration, not state: it is built once at startup
//! (the built-in table plus any `[[relationships]]` entries from settings)
//! and shared by reference. Every query normalizes its type names first.
//!
//! ```text
//! Project ──AssetId→Id──────────▶ Asset ──LibraryId→Id──▶ Library
//!    │                              ▲
//!    └──Id→ProjectId (many)──▶ Defect ──IdentifiedBy→Id──▶ User
//! ```

mod entity_type;
mod relationship;

pub use entity_type::EntityType;
pub use relationship::{AvailableField, RelationshipDefinition};

use std::collections::{BTreeSet, HashMap};

use crate::record::ID_FIELD;

/// Immutable table of relationships keyed by owning entity type.
#[derive(Debug, Clone, Default)]
pub struct RelationshipCatalog {
    relationships: HashMap<String, Vec<RelationshipDefinition>>,
}

impl RelationshipCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// A catalog with no relationships.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The backend's built-in relationship table.
    pub fn standard() -> Self {
        standard_builder().build()
    }

    /// All relationships owned by `entity_type` (empty if unknown).
    pub fn relationships_of(&self, entity_type: &str) -> &[RelationshipDefinition] {
        self.relationships
            .get(&catalog_key(entity_type))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The first relationship from `source` to `target`.
    pub fn relationship_to(&self, source: &str, target: &str) -> Option<&RelationshipDefinition> {
        let target = EntityType::new(target);
        self.relationships_of(source)
            .iter()
            .find(|rel| rel.target.as_str().eq_ignore_ascii_case(target.as_str()))
    }

    pub fn has_relationship(&self, source: &str, target: &str) -> bool {
        self.relationship_to(source, target).is_some()
    }

    /// Whether `name` denotes an entity type: a canonical backend type, or
    /// any type that appears as owner or target in this catalog.
    pub fn is_entity_type(&self, name: &str) -> bool {
        let entity_type = EntityType::new(name);
        if entity_type.is_known() {
            return true;
        }
        self.relationships.contains_key(&catalog_key(name))
            || self
                .relationships
                .values()
                .flatten()
                .any(|rel| rel.target.matches(name))
    }

    /// Every field some relationship uses to look up records of
    /// `entity_type`, plus the primary id.
    pub fn key_fields_for(&self, entity_type: &EntityType) -> BTreeSet<String> {
        let mut keys: BTreeSet<String> = self
            .relationships
            .values()
            .flatten()
            .filter(|rel| rel.target.matches(entity_type.as_str()))
            .map(|rel| rel.target_key.clone())
            .collect();
        keys.insert(ID_FIELD.to_string());
        keys
    }

    /// Fields selectable for an export of `entity_type`: its direct fields,
    /// then `<Target>.<field>` for every single-valued relationship.
    pub fn available_fields(&self, entity_type: &str) -> Vec<AvailableField> {
        let owner = EntityType::new(entity_type);

        let mut fields: Vec<AvailableField> = direct_fields(&owner)
            .iter()
            .map(|field| AvailableField {
                field_path: field.to_string(),
                display_name: field.to_string(),
                entity_type: owner.clone(),
                is_related: false,
                related_entity: None,
                description: None,
            })
            .collect();

        for rel in self.relationships_of(entity_type).iter().filter(|r| !r.is_collection) {
            fields.extend(direct_fields(&rel.target).iter().map(|field| {
                let path = format!("{}.{}", rel.target, field);
                AvailableField {
                    field_path: path.clone(),
                    display_name: path,
                    entity_type: owner.clone(),
                    is_related: true,
                    related_entity: Some(rel.target.clone()),
                    description: Some(rel.description.clone()),
                }
            }));
        }

        fields
    }
}

/// Builder for [`RelationshipCatalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    relationships: HashMap<String, Vec<RelationshipDefinition>>,
}

impl CatalogBuilder {
    /// Start from the built-in table.
    pub fn standard() -> Self {
        standard_builder()
    }

    /// Append a relationship owned by `source`. Earlier entries win lookups.
    pub fn relate(mut self, source: impl Into<EntityType>, rel: RelationshipDefinition) -> Self {
        let source = source.into();
        self.relationships
            .entry(catalog_key(source.as_str()))
            .or_default()
            .push(rel);
        self
    }

    pub fn one(
        self,
        source: EntityType,
        target: EntityType,
        source_key: &str,
        target_key: &str,
        description: &str,
    ) -> Self {
        self.relate(
            source,
            RelationshipDefinition::one(target, source_key, target_key, description),
        )
    }

    pub fn many(
        self,
        source: EntityType,
        target: EntityType,
        source_key: &str,
        target_key: &str,
        description: &str,
    ) -> Self {
        self.relate(
            source,
            RelationshipDefinition::many(target, source_key, target_key, description),
        )
    }

    pub fn build(self) -> RelationshipCatalog {
        RelationshipCatalog {
            relationships: self.relationships,
        }
    }
}

fn catalog_key(name: &str) -> String {
    EntityType::new(name).as_str().to_ascii_lowercase()
}

fn standard_builder() -> CatalogBuilder {
    use EntityType as E;

    CatalogBuilder::default()
        .one(E::PROJECT, E::ASSET, "AssetId", "Id", "Parent asset information")
        .many(E::PROJECT, E::DEFECT, "Id", "ProjectId", "Related defects")
        .many(E::PROJECT, E::CHECKLIST, "Id", "ProjectId", "Related checklists")
        .many(E::PROJECT, E::MEASUREMENT, "Id", "ProjectId", "Related measurements")
        .many(E::PROJECT, E::INSPECTION_MEDIA, "Id", "ProjectId", "Related inspection media")
        .many(E::ASSET, E::PROJECT, "Id", "AssetId", "Projects using this asset")
        .one(E::ASSET, E::LIBRARY, "LibraryId", "Id", "Associated library")
        .many(E::ASSET, E::DEFECT, "Id", "AssetId", "Related defects")
        .many(E::ASSET, E::MEASUREMENT, "Id", "AssetId", "Related measurements")
        .one(E::DEFECT, E::PROJECT, "ProjectId", "Id", "Parent project")
        .one(E::DEFECT, E::ASSET, "AssetId", "Id", "Related asset")
        .one(E::DEFECT, E::USER, "IdentifiedBy", "Id", "User who identified the defect")
        .many(E::DEFECT, E::DEFECT_OVERLAY, "Id", "DefectId", "Defect overlays")
        .one(E::DEFECT_OVERLAY, E::DEFECT, "DefectId", "Id", "Parent defect")
        .one(E::DEFECT_OVERLAY, E::INSPECTION_MEDIA, "MediaId", "Id", "Associated media")
        .one(E::DEFECT_OVERLAY, E::USER, "CreatedBy", "Id", "User who created the overlay")
        .one(E::CHECKLIST, E::PROJECT, "ProjectId", "Id", "Parent project")
        .one(E::MEASUREMENT, E::PROJECT, "ProjectId", "Id", "Parent project")
        .one(E::MEASUREMENT, E::ASSET, "AssetId", "Id", "Related asset")
        .one(E::INSPECTION_MEDIA, E::PROJECT, "ProjectId", "Id", "Parent project")
        .many(E::LIBRARY, E::ASSET, "Id", "LibraryId", "Assets using this library")
        .many(E::LIBRARY, E::LIBRARY_MEDIA, "Id", "LibraryId", "Library media items")
        .one(E::LIBRARY_MEDIA, E::LIBRARY, "LibraryId", "Id", "Parent library")
        .many(E::USER, E::DEFECT, "Id", "IdentifiedBy", "Defects identified by this user")
        .many(E::USER, E::DEFECT_OVERLAY, "Id", "CreatedBy", "Overlays created by this user")
        .one(E::TASK, E::PROJECT, "ProjectId", "Id", "Project the task belongs to")
        .one(E::TASK, E::USER, "AssignedTo", "Id", "User the task is assigned to")
}

/// Direct (unjoined) fields offered for each canonical entity type.
pub fn direct_fields(entity_type: &EntityType) -> &'static [&'static str] {
    match entity_type.as_str() {
        "Asset" => &[
            "Id", "Name", "Description", "AssetType", "Location", "Status", "CreatedAt",
            "UpdatedAt", "ExternalId",
        ],
        "Project" => &[
            "Id", "Name", "Description", "AssetId", "ProjectTypeId", "Status", "StartDate",
            "EndDate", "CreatedAt", "UpdatedAt",
        ],
        "Defect" => &[
            "Id", "ProjectId", "AssetId", "Title", "Description", "Severity", "Status",
            "DefectType", "Location", "IdentifiedBy", "IdentifiedAt",
        ],
        "Measurement" => &[
            "Id", "ProjectId", "AssetId", "MeasurementType", "Value", "Unit", "Location",
            "MeasuredBy", "MeasuredAt",
        ],
        "InspectionMedia" => &[
            "Id", "ProjectId", "FileName", "FileType", "FileSize", "Status", "DownloadUrl",
            "ThumbnailUrl", "UploadedAt",
        ],
        "Checklist" => &["Id", "ProjectId", "Name", "TemplateId", "Status", "CompletedBy", "CompletedAt"],
        "User" => &["Id", "Email", "FirstName", "LastName", "Role"],
        "Workspace" => &["Id", "Name", "Description"],
        "Library" => &["Id", "Name", "Description", "LibraryType"],
        "LibraryMedia" => &["Id", "LibraryId", "FileName", "FileType", "FileSize"],
        "DefectOverlay" => &["Id", "DefectId", "MediaId", "CreatedBy", "CreatedAt"],
        "Task" => &[
            "Id", "Title", "Description", "Status", "Priority", "AssignedTo", "ProjectId",
            "DueDate", "CompletedDate",
        ],
        _ => &[],
    }
}
