//! Snapshot model and the context assemblers fetch through.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use super::CancelSignal;
use crate::catalog::EntityType;
use crate::fetch::{EntityFetcher, FetchResult, Filters};
use crate::record::Record;

/// A related slot of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Related {
    /// An optional fetch that did not resolve.
    Absent,
    One(Record),
    Many(Vec<Record>),
}

impl Related {
    pub fn is_absent(&self) -> bool {
        matches!(self, Related::Absent)
    }

    pub fn as_one(&self) -> Option<&Record> {
        match self {
            Related::One(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_many(&self) -> &[Record] {
        match self {
            Related::Many(records) => records,
            _ => &[],
        }
    }
}

/// A root record plus its named related slots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub root_type: EntityType,
    pub root_id: String,
    pub root: Record,
    pub related: BTreeMap<String, Related>,
}

impl Snapshot {
    pub fn new(root_type: EntityType, root_id: impl Into<String>, root: Record) -> Self {
        Self {
            root_type,
            root_id: root_id.into(),
            root,
            related: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, related: Related) -> Self {
        self.related.insert(name.to_string(), related);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Related> {
        self.related.get(name)
    }

    /// The single record in `name`, if present.
    pub fn one(&self, name: &str) -> Option<&Record> {
        self.get(name).and_then(Related::as_one)
    }

    /// The collection in `name`; empty if missing.
    pub fn many(&self, name: &str) -> &[Record] {
        self.get(name).map(Related::as_many).unwrap_or(&[])
    }

    pub fn is_absent(&self, name: &str) -> bool {
        self.get(name).map_or(true, Related::is_absent)
    }
}

/// Fetch access for assemblers. Every call observes the cancel signal.
pub struct FetchContext<'a> {
    fetcher: &'a dyn EntityFetcher,
    cancel: &'a CancelSignal,
}

impl<'a> FetchContext<'a> {
    pub fn new(fetcher: &'a dyn EntityFetcher, cancel: &'a CancelSignal) -> Self {
        Self { fetcher, cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A mandatory single fetch.
    pub async fn fetch_one(&self, entity_type: &EntityType, id: &str) -> FetchResult<Record> {
        self.cancel.run(self.fetcher.fetch_one(entity_type, id)).await
    }

    /// A mandatory collection fetch.
    pub async fn fetch_all(
        &self,
        entity_type: &EntityType,
        filters: &Filters,
    ) -> FetchResult<Vec<Record>> {
        self.cancel.run(self.fetcher.fetch_all(entity_type, filters)).await
    }

    pub async fn fetch_many(
        &self,
        entity_type: &EntityType,
        filters: &Filters,
    ) -> FetchResult<Related> {
        self.fetch_all(entity_type, filters).await.map(Related::Many)
    }

    /// An optional single fetch: a missing id or any failure other than
    /// cancellation yields [`Related::Absent`].
    pub async fn optional_one(
        &self,
        entity_type: &EntityType,
        id: Option<&str>,
    ) -> FetchResult<Related> {
        let Some(id) = id else {
            return Ok(Related::Absent);
        };
        match self.fetch_one(entity_type, id).await {
            Ok(record) => Ok(Related::One(record)),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                warn!(%entity_type, id, error = %err, "optional fetch failed, marking absent");
                Ok(Related::Absent)
            }
        }
    }
}

/// Builds one snapshot shape from a root id.
///
/// Failure of the root fetch (or any other mandatory fetch) is returned;
/// optional parts are recovered as [`Related::Absent`].
#[async_trait]
pub trait SnapshotAssembler: Send + Sync {
    /// Entity type of the root record.
    fn root_type(&self) -> EntityType;

    async fn assemble(&self, ctx: &FetchContext<'_>, root_id: &str) -> FetchResult<Snapshot>;
}
