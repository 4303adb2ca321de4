//! Tabular export planning.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │ SheetConfiguration(s)    │  entity type, mappings, parent filter, start row
//! └────────────┬─────────────┘
//!              ▼
//!   required_related_entities ──▶ set of types to fetch (once per workbook
//!              │                   when link_related_data is set)
//!              ▼
//!   EntityFetcher::fetch_all ×N ──▶ EntityCache ──▶ FieldResolver
//!              │
//!              ▼
//!   per sheet: parent filter → resolve_cell per mapping → Sheet
//!              │
//!              ▼
//!   Workbook (empty sheets dropped) ──▶ writer
//! ```

mod error;
mod planner;
mod request;
mod workbook;

pub use error::{ExportError, ExportResult};
pub use planner::ExportPlanner;
pub use request::{ExportRequest, FieldMapping, MultiSheetExportRequest, SheetConfiguration};
pub use workbook::{Sheet, Workbook};
