//! Per-operation record cache with key indexes.

use std::collections::HashMap;

use tracing::debug;

use crate::catalog::{EntityType, RelationshipCatalog};
use crate::record::Record;

/// Position of the first record carrying each key value.
type KeyIndex = HashMap<String, usize>;

/// Entity collections fetched for one export or aggregation.
///
/// Built once and never mutated. Every record is indexed by each field that
/// some catalog relationship targets on its type, so joins are hash lookups
/// rather than scans. When two records share a key value the first one wins,
/// matching a front-to-back scan.
#[derive(Debug, Default)]
pub struct EntityCache {
    collections: HashMap<EntityType, Vec<Record>>,
    indexes: HashMap<EntityType, HashMap<String, KeyIndex>>,
}

impl EntityCache {
    pub fn build(
        collections: HashMap<EntityType, Vec<Record>>,
        catalog: &RelationshipCatalog,
    ) -> Self {
        let mut normalized: HashMap<EntityType, Vec<Record>> = HashMap::new();
        for (entity_type, records) in collections {
            normalized
                .entry(EntityType::new(entity_type.as_str()))
                .or_default()
                .extend(records);
        }

        let mut indexes = HashMap::new();
        for (entity_type, records) in &normalized {
            let mut by_field = HashMap::new();
            for key_field in catalog.key_fields_for(entity_type) {
                let mut index = KeyIndex::new();
                for (position, record) in records.iter().enumerate() {
                    if let Some(key) = record.key_at(&key_field) {
                        index.entry(key).or_insert(position);
                    }
                }
                by_field.insert(key_field, index);
            }
            debug!(
                %entity_type,
                records = records.len(),
                keys = by_field.len(),
                "indexed entity collection"
            );
            indexes.insert(entity_type.clone(), by_field);
        }

        Self {
            collections: normalized,
            indexes,
        }
    }

    /// Every cached record of a type, in fetch order.
    pub fn records(&self, entity_type: &EntityType) -> &[Record] {
        self.collections
            .get(entity_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, entity_type: &EntityType) -> bool {
        self.collections.contains_key(entity_type)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.collections.keys()
    }

    /// The first record of `entity_type` whose `key_field` equals `value`.
    ///
    /// Uses the index when the field was declared as a relationship target;
    /// falls back to a scan for fields nothing declared.
    pub fn find(&self, entity_type: &EntityType, key_field: &str, value: &str) -> Option<&Record> {
        let records = self.collections.get(entity_type)?;

        let index = self.indexes.get(entity_type).and_then(|by_field| {
            by_field.get(key_field).or_else(|| {
                by_field
                    .iter()
                    .find(|(field, _)| field.eq_ignore_ascii_case(key_field))
                    .map(|(_, index)| index)
            })
        });

        match index {
            Some(index) => index.get(value).and_then(|&position| records.get(position)),
            None => records
                .iter()
                .find(|record| record.key_at(key_field).as_deref() == Some(value)),
        }
    }
}
