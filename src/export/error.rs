//! Export error types.

use thiserror::Error;

use crate::catalog::EntityType;
use crate::fetch::FetchError;

/// Result type for export planning.
pub type ExportResult<T> = Result<T, ExportError>;

/// Errors that can occur while planning an export.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The request cannot be planned as given.
    #[error("invalid export request: {0}")]
    InvalidRequest(String),

    /// A single-sheet export matched no records.
    #[error("no {entity_type} records to export")]
    NoData { entity_type: EntityType },

    /// No sheet of a multi-sheet export produced a row.
    #[error("no data for any sheet")]
    EmptyWorkbook,

    /// A mandatory collection could not be fetched.
    #[error("failed to fetch {entity_type}: {source}")]
    Fetch {
        entity_type: EntityType,
        #[source]
        source: FetchError,
    },

    /// The cancel signal fired.
    #[error("export cancelled")]
    Cancelled,
}

impl ExportError {
    pub(crate) fn fetch(entity_type: &EntityType, source: FetchError) -> Self {
        if source.is_cancelled() {
            return Self::Cancelled;
        }
        Self::Fetch {
            entity_type: entity_type.clone(),
            source,
        }
    }

    /// Whether the export failed for lack of data rather than a fault.
    pub fn is_empty_result(&self) -> bool {
        matches!(self, Self::NoData { .. } | Self::EmptyWorkbook)
    }
}
