//! Which related entity types an export has to fetch.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::resolver::FieldPath;
use crate::catalog::{EntityType, RelationshipCatalog};
use crate::export::{FieldMapping, SheetConfiguration};

/// Related types referenced by the selected, qualified mappings of a sheet
/// rooted at `source`.
///
/// A prefix without a configured relationship from `source` is dropped, so a
/// bogus mapping yields an empty column instead of failing the export.
pub fn required_related_entities<'a>(
    catalog: &RelationshipCatalog,
    source: &EntityType,
    mappings: impl IntoIterator<Item = &'a FieldMapping>,
) -> BTreeSet<EntityType> {
    let mut required = BTreeSet::new();

    for mapping in mappings.into_iter().filter(|m| m.is_selected) {
        let FieldPath::Related { entity_type, .. } =
            FieldPath::classify(&mapping.api_field, catalog)
        else {
            continue;
        };

        match catalog.relationship_to(source.as_str(), entity_type) {
            Some(rel) => {
                required.insert(rel.target.clone());
            }
            None => debug!(
                %source,
                field = %mapping.api_field,
                "dropping mapping prefix with no configured relationship"
            ),
        }
    }

    required
}

/// [`required_related_entities`] for every sheet, unioned per root type.
pub fn required_related_entities_for_sheets(
    catalog: &RelationshipCatalog,
    sheets: &[SheetConfiguration],
) -> BTreeMap<EntityType, BTreeSet<EntityType>> {
    let mut required: BTreeMap<EntityType, BTreeSet<EntityType>> = BTreeMap::new();
    for sheet in sheets {
        let source = sheet.normalized_entity_type();
        let related = required_related_entities(catalog, &source, &sheet.mappings);
        required.entry(source).or_default().extend(related);
    }
    required
}
