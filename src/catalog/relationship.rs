//! Relationship definitions between entity types.

use serde::{Deserialize, Serialize};

use super::EntityType;

/// A declared one-hop foreign-key linkage from an owning entity type.
///
/// To go from an instance of the owner to the target, read `source_key` on
/// the source record and find target records whose `target_key` equals it.
/// Collection relationships may match many targets; they are never used for
/// field-path flattening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    pub target: EntityType,
    pub source_key: String,
    pub target_key: String,
    pub description: String,
    #[serde(default)]
    pub is_collection: bool,
}

impl RelationshipDefinition {
    /// A single-valued (many-to-one) relationship.
    pub fn one(
        target: EntityType,
        source_key: impl Into<String>,
        target_key: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            target,
            source_key: source_key.into(),
            target_key: target_key.into(),
            description: description.into(),
            is_collection: false,
        }
    }

    /// A one-to-many relationship.
    pub fn many(
        target: EntityType,
        source_key: impl Into<String>,
        target_key: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            is_collection: true,
            ..Self::one(target, source_key, target_key, description)
        }
    }
}

/// A field that can be selected in an export mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableField {
    pub field_path: String,
    pub display_name: String,
    pub entity_type: EntityType,
    pub is_related: bool,
    pub related_entity: Option<EntityType>,
    pub description: Option<String>,
}
