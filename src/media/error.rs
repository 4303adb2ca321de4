//! Media download error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::fetch::FetchError;

/// Result type for media downloads.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that stop a whole download run.
///
/// A single file that fails is not an error here; it is logged, skipped,
/// and listed in the report.
#[derive(Error, Debug)]
pub enum MediaError {
    /// Listing the media, or fetching the owning defect, failed.
    #[error(transparent)]
    Fetch(FetchError),

    #[error("failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The owner has nothing to download.
    #[error("no image urls found for {0}")]
    NoImages(String),

    /// The cancel signal fired; nothing was written.
    #[error("download cancelled")]
    Cancelled,
}

impl From<FetchError> for MediaError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => MediaError::Cancelled,
            other => MediaError::Fetch(other),
        }
    }
}

impl MediaError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled)
    }
}
