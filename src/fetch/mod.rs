//! Entity fetch port.
//!
//! The [`EntityFetcher`] trait abstracts over the ways entity collections can
//! be retrieved. The REST implementation paginates internally; callers
//! always receive the full matching set.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        EntityFetcher                            │
//! │  - fetch_all(type, filters)  → every matching record            │
//! │  - fetch_one(type, id)       → one record, or NotFound          │
//! └─────────────────────────────────────────────────────────────────┘
//!            │                                   │
//!            ▼                                   ▼
//! ┌──────────────────────────┐       ┌──────────────────────────────┐
//! │   HttpEntityFetcher      │       │   InMemoryFetcher            │
//! │   (token auth, paging)   │       │   (fixtures, test double)    │
//! └──────────────────────────┘       └──────────────────────────────┘
//! ```

mod error;
mod http;
mod memory;

pub use error::{FetchError, FetchResult};
pub use http::HttpEntityFetcher;
pub use memory::InMemoryFetcher;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::catalog::EntityType;
use crate::record::Record;

/// Query filters passed through to the backend (`project_id=P1`).
pub type Filters = BTreeMap<String, String>;

/// Build a single-entry filter map.
pub fn filter(key: &str, value: &str) -> Filters {
    Filters::from([(key.to_string(), value.to_string())])
}

/// Trait for retrieving entity records.
#[async_trait]
pub trait EntityFetcher: Send + Sync {
    /// Every record of `entity_type` matching `filters`.
    async fn fetch_all(&self, entity_type: &EntityType, filters: &Filters)
        -> FetchResult<Vec<Record>>;

    /// A single record by id. Fails with [`FetchError::NotFound`] if absent.
    async fn fetch_one(&self, entity_type: &EntityType, id: &str) -> FetchResult<Record>;
}
