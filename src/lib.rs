//! # Tabula
//!
//! Relationship-aware tabular exports from a paginated, entity-oriented REST
//! backend (projects, assets, defects, measurements, media, checklists, users).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Export request (single / multi sheet)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [export planner]
//! ┌─────────────────────────────────────────────────────────┐
//! │     Required entity types (roots + joined targets)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [entity fetch port]
//! ┌─────────────────────────────────────────────────────────┐
//! │        EntityCache (indexed by every target key)        │
//! │        + RelationshipCatalog (static, injected)         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [field resolver]
//! ┌─────────────────────────────────────────────────────────┐
//! │            Workbook (header + string rows)              │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The [`aggregate`] module sits beside the planner: it gathers a root
//! entity's related collections into per-root snapshots under a bounded
//! concurrency ceiling. The [`media`] module downloads the files that media
//! and defect overlay records point at.

pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod export;
pub mod fetch;
pub mod media;
pub mod record;
pub mod resolve;
pub mod templates;
pub mod writer;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::aggregate::{
        Aggregator, CancelSignal, GatherError, ProjectAssembler, Related, Snapshot,
        SnapshotAssembler, TaskAssembler,
    };
    pub use crate::catalog::{EntityType, RelationshipCatalog, RelationshipDefinition};
    pub use crate::export::{
        ExportError, ExportPlanner, ExportRequest, FieldMapping, MultiSheetExportRequest,
        SheetConfiguration, Sheet, Workbook,
    };
    pub use crate::fetch::{EntityFetcher, FetchError, Filters, InMemoryFetcher};
    pub use crate::media::{DownloadReport, MediaDownloader, MediaSource};
    pub use crate::record::{Record, Value};
    pub use crate::resolve::{EntityCache, FieldResolver};
}

pub use catalog::{EntityType, RelationshipCatalog};
pub use record::{Record, Value};
