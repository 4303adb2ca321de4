//! Field path resolution over an [`EntityCache`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use super::EntityCache;
use crate::catalog::{EntityType, RelationshipCatalog};
use crate::record::{Record, Value};

/// How a field path is interpreted against its owner type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldPath<'a> {
    /// A nested lookup on the record itself (`Name`, `parent.name`).
    Direct(&'a str),
    /// A one-hop join (`Asset.Name`).
    Related { entity_type: &'a str, rest: &'a str },
}

impl<'a> FieldPath<'a> {
    /// Split a path at its first dot when the leading segment names an
    /// entity type the catalog knows. Anything else is a direct lookup.
    pub(crate) fn classify(path: &'a str, catalog: &RelationshipCatalog) -> Self {
        match path.split_once('.') {
            Some((head, rest))
                if !head.is_empty() && !rest.is_empty() && catalog.is_entity_type(head) =>
            {
                FieldPath::Related {
                    entity_type: head,
                    rest,
                }
            }
            _ => FieldPath::Direct(path),
        }
    }
}

/// Resolves field paths, following catalog relationships one hop.
///
/// Resolution never fails: every miss (unconfigured join, missing foreign
/// key, unmatched target, absent nested field) is `None`.
#[derive(Debug)]
pub struct FieldResolver {
    cache: EntityCache,
    catalog: Arc<RelationshipCatalog>,
}

impl FieldResolver {
    pub fn new(cache: EntityCache, catalog: Arc<RelationshipCatalog>) -> Self {
        Self { cache, catalog }
    }

    /// Index `collections` and build a resolver over them.
    pub fn build(
        collections: HashMap<EntityType, Vec<Record>>,
        catalog: Arc<RelationshipCatalog>,
    ) -> Self {
        let cache = EntityCache::build(collections, &catalog);
        Self::new(cache, catalog)
    }

    pub fn cache(&self) -> &EntityCache {
        &self.cache
    }

    pub fn catalog(&self) -> &RelationshipCatalog {
        &self.catalog
    }

    /// Resolve `path` on `record`, an instance of `owner`.
    pub fn resolve(&self, record: &Record, path: &str, owner: &EntityType) -> Option<Value> {
        match FieldPath::classify(path, &self.catalog) {
            FieldPath::Direct(path) => record.lookup(path).cloned(),
            FieldPath::Related { entity_type, rest } => {
                self.resolve_related(record, owner, entity_type, rest)
            }
        }
    }

    /// Resolve and render for an output cell; misses are empty strings.
    pub fn resolve_cell(&self, record: &Record, path: &str, owner: &EntityType) -> String {
        self.resolve(record, path, owner)
            .map(|value| value.render())
            .unwrap_or_default()
    }

    fn resolve_related(
        &self,
        record: &Record,
        owner: &EntityType,
        related: &str,
        rest: &str,
    ) -> Option<Value> {
        let Some(rel) = self.catalog.relationship_to(owner.as_str(), related) else {
            trace!(%owner, related, "no relationship configured");
            return None;
        };
        if rel.is_collection {
            trace!(%owner, related, "collection relationships are not flattened");
            return None;
        }

        let foreign_key = record.key_at(&rel.source_key)?;
        let target = self.cache.find(&rel.target, &rel.target_key, &foreign_key)?;

        // Only one hop is followed
        match FieldPath::classify(rest, &self.catalog) {
            FieldPath::Direct(rest) => target.lookup(rest).cloned(),
            FieldPath::Related { .. } => {
                trace!(%owner, related, rest, "multi-hop path not supported");
                None
            }
        }
    }
}
