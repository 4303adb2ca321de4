//! Aggregation error types.

use thiserror::Error;

use super::Snapshot;
use crate::fetch::FetchError;

/// Result type for aggregation operations.
pub type GatherResult<T> = Result<T, GatherError>;

/// A root whose mandatory fetch failed during a batch.
#[derive(Debug)]
pub struct ItemFailure {
    /// Position of the root in the request.
    pub index: usize,
    pub root_id: String,
    pub error: FetchError,
}

/// Errors that can occur while gathering snapshots.
#[derive(Error, Debug)]
pub enum GatherError {
    /// The cancel signal fired; partial results were discarded.
    #[error("gathering cancelled")]
    Cancelled,

    /// At least one item failed after every item had run.
    ///
    /// `partial` holds one slot per requested root, in request order, with
    /// the snapshots that did complete.
    #[error("{} of {} snapshot assemblies failed", .failures.len(), .partial.len())]
    Failed {
        failures: Vec<ItemFailure>,
        partial: Vec<Option<Snapshot>>,
    },

    /// A fetch outside the per-item fan-out failed (root listing, the asset
    /// of an asset snapshot).
    #[error(transparent)]
    Fetch(FetchError),
}

impl From<FetchError> for GatherError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => GatherError::Cancelled,
            other => GatherError::Fetch(other),
        }
    }
}

impl GatherError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GatherError::Cancelled)
    }

    /// The per-item failures, if this is a batch failure.
    pub fn failures(&self) -> &[ItemFailure] {
        match self {
            GatherError::Failed { failures, .. } => failures,
            _ => &[],
        }
    }
}
