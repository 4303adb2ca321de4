//! In-memory fetcher for fixtures and tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use inflector::cases::pascalcase::to_pascal_case;

use super::{EntityFetcher, FetchError, FetchResult, Filters};
use crate::catalog::EntityType;
use crate::record::Record;

/// Filter keys that do not name a record field directly.
const FILTER_FIELDS: &[(&str, Option<&str>)] = &[
    ("asset_search", Some("AssetId")),
    ("limit", None),
    ("offset", None),
];

/// Fetcher serving records from memory.
///
/// Used for offline exports from a JSON dump and as the test double for the
/// aggregator and planner: it counts calls per entity type, tracks peak
/// concurrency, and can be told to fail or to stall.
#[derive(Debug, Default)]
pub struct InMemoryFetcher {
    collections: HashMap<EntityType, Vec<Record>>,
    failing: HashSet<(EntityType, Option<String>)>,
    latency: Option<Duration>,
    stats: Mutex<CallStats>,
}

#[derive(Debug, Default)]
struct CallStats {
    fetch_all: HashMap<EntityType, usize>,
    fetch_one: HashMap<EntityType, usize>,
    in_flight: usize,
    peak_in_flight: usize,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON dump shaped `{ "<entity type>": [ {..}, .. ], .. }`.
    ///
    /// Type names are normalized and record keys go through the same
    /// snake_case → PascalCase conversion as live API payloads.
    pub fn from_json(json: serde_json::Value) -> FetchResult<Self> {
        let serde_json::Value::Object(map) = json else {
            return Err(FetchError::Decode("fixture must be a JSON object".to_string()));
        };

        let mut fetcher = Self::new();
        for (name, items) in map {
            let serde_json::Value::Array(items) = items else {
                return Err(FetchError::Decode(format!("fixture entry '{}' must be an array", name)));
            };
            let records = items
                .into_iter()
                .map(|item| {
                    Record::from_api_json(item).ok_or_else(|| {
                        FetchError::Decode(format!("fixture entry '{}' contains a non-object", name))
                    })
                })
                .collect::<FetchResult<Vec<_>>>()?;
            fetcher = fetcher.with_records(EntityType::new(&name), records);
        }
        Ok(fetcher)
    }

    /// Append records for an entity type.
    pub fn with_records(mut self, entity_type: EntityType, records: Vec<Record>) -> Self {
        self.collections.entry(entity_type).or_default().extend(records);
        self
    }

    /// Make `fetch_all` for this type fail with a 500.
    pub fn failing_all(mut self, entity_type: EntityType) -> Self {
        self.failing.insert((entity_type, None));
        self
    }

    /// Make `fetch_one` for this id fail with a 500.
    pub fn failing_one(mut self, entity_type: EntityType, id: &str) -> Self {
        self.failing.insert((entity_type, Some(id.to_string())));
        self
    }

    /// Delay every call, so concurrent callers overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `fetch_all` calls made for a type.
    pub fn fetch_all_calls(&self, entity_type: &EntityType) -> usize {
        self.stats().fetch_all.get(entity_type).copied().unwrap_or(0)
    }

    /// Number of `fetch_one` calls made for a type.
    pub fn fetch_one_calls(&self, entity_type: &EntityType) -> usize {
        self.stats().fetch_one.get(entity_type).copied().unwrap_or(0)
    }

    /// Total calls of either kind.
    pub fn total_calls(&self) -> usize {
        let stats = self.stats();
        stats.fetch_all.values().sum::<usize>() + stats.fetch_one.values().sum::<usize>()
    }

    /// Highest number of calls that were in progress at once.
    pub fn peak_in_flight(&self) -> usize {
        self.stats().peak_in_flight
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &EntityType> {
        self.collections.keys()
    }

    fn stats(&self) -> MutexGuard<'_, CallStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self) -> InFlight<'_> {
        let mut stats = self.stats();
        stats.in_flight += 1;
        stats.peak_in_flight = stats.peak_in_flight.max(stats.in_flight);
        InFlight { fetcher: self }
    }

    async fn stall(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn injected_failure(&self, entity_type: &EntityType, id: Option<&str>) -> FetchResult<()> {
        if self
            .failing
            .contains(&(entity_type.clone(), id.map(str::to_string)))
        {
            return Err(FetchError::Status {
                status: 500,
                body: format!("injected failure for {}", entity_type),
            });
        }
        Ok(())
    }
}

/// Decrements the in-flight counter even when the call future is dropped.
struct InFlight<'a> {
    fetcher: &'a InMemoryFetcher,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.fetcher.stats().in_flight -= 1;
    }
}

fn matches_filters(record: &Record, filters: &Filters) -> bool {
    filters.iter().all(|(key, expected)| {
        let field = match FILTER_FIELDS.iter().find(|(name, _)| name == key) {
            Some((_, Some(field))) => field.to_string(),
            Some((_, None)) => return true,
            None => to_pascal_case(key),
        };
        record.key_at(&field).as_deref() == Some(expected.as_str())
    })
}

#[async_trait]
impl EntityFetcher for InMemoryFetcher {
    async fn fetch_all(
        &self,
        entity_type: &EntityType,
        filters: &Filters,
    ) -> FetchResult<Vec<Record>> {
        *self.stats().fetch_all.entry(entity_type.clone()).or_default() += 1;
        let _guard = self.begin();
        self.stall().await;
        self.injected_failure(entity_type, None)?;

        Ok(self
            .collections
            .get(entity_type)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| matches_filters(r, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_one(&self, entity_type: &EntityType, id: &str) -> FetchResult<Record> {
        *self.stats().fetch_one.entry(entity_type.clone()).or_default() += 1;
        let _guard = self.begin();
        self.stall().await;
        self.injected_failure(entity_type, Some(id))?;

        self.collections
            .get(entity_type)
            .and_then(|records| records.iter().find(|r| r.id().as_deref() == Some(id)))
            .cloned()
            .ok_or_else(|| FetchError::not_found(entity_type, id))
    }
}
