//! Media file downloads.
//!
//! Inspection media and defect overlay images live behind download URLs on
//! their records. This module turns those records into files on disk.
//!
//! # Architecture
//!
//! ```text
//!   project id ──▶ InspectionMedia(project_id) ──▶ DownloadUrl, FileName
//!   defect id  ──▶ Defect.Overlays[] ──▶ DisplayUrl, Media.DownloadUrl, Media.ThumbnailUrl
//!                                  │
//!                                  ▼
//!                        Vec<MediaRequest> (input order)
//!                                  │
//!                                  ▼ buffer_unordered(max_concurrency)
//!                        MediaSource::download(url)
//!                                  │
//!                                  ▼
//!                files in <dir>, duplicate names get `_2`, `_3`, ...
//! ```
//!
//! A file that fails to download or write is logged, skipped, and listed in
//! the [`DownloadReport`]. Cancellation stops the run before anything is
//! written.

mod error;
mod http;
mod memory;

pub use error::{MediaError, MediaResult};
pub use http::HttpMediaSource;
pub use memory::InMemoryMediaSource;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregate::CancelSignal;
use crate::catalog::EntityType;
use crate::fetch::{filter, EntityFetcher, FetchResult};
use crate::record::{Record, Value};

/// Default number of files downloaded at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Bytes fetched from a media URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub bytes: Vec<u8>,
    /// MIME type without parameters (`image/png`).
    pub content_type: Option<String>,
}

/// Where media bytes come from.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn download(&self, url: &str) -> FetchResult<Download>;
}

/// One file to fetch. Without a name, the file is named after the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    pub url: String,
    pub file_name: Option<String>,
}

impl MediaRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            file_name: None,
        }
    }

    pub fn named(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// A file that was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaFailure {
    pub url: String,
    pub file_name: Option<String>,
    pub error: String,
}

/// Outcome of a download run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    /// Files written, in request order.
    pub downloaded: Vec<PathBuf>,
    pub failed: Vec<MediaFailure>,
    /// Records that carried no download URL.
    pub skipped: usize,
}

/// Lists media through an [`EntityFetcher`] and writes it through a
/// [`MediaSource`].
pub struct MediaDownloader {
    fetcher: Arc<dyn EntityFetcher>,
    source: Arc<dyn MediaSource>,
    max_concurrency: usize,
    cancel: CancelSignal,
}

impl MediaDownloader {
    pub fn new(fetcher: Arc<dyn EntityFetcher>, source: Arc<dyn MediaSource>) -> Self {
        Self {
            fetcher,
            source,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cancel: CancelSignal::new(),
        }
    }

    /// Zero is treated as one.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// One request per inspection media record of the project that has a
    /// download URL, plus the number of records without one.
    pub async fn project_media_requests(
        &self,
        project_id: &str,
    ) -> MediaResult<(Vec<MediaRequest>, usize)> {
        let media_type = EntityType::INSPECTION_MEDIA;
        let media = self
            .cancel
            .run(self.fetcher.fetch_all(&media_type, &filter("project_id", project_id)))
            .await?;

        let mut requests = Vec::with_capacity(media.len());
        let mut skipped = 0;
        for record in &media {
            match non_empty(record, "DownloadUrl") {
                Some(url) => {
                    let mut request = MediaRequest::new(url);
                    request.file_name = non_empty(record, "FileName");
                    requests.push(request);
                }
                None => skipped += 1,
            }
        }
        Ok((requests, skipped))
    }

    /// Every media file of a project, written into `dir`.
    pub async fn download_project_media(
        &self,
        project_id: &str,
        dir: &Path,
    ) -> MediaResult<DownloadReport> {
        let (requests, skipped) = self.project_media_requests(project_id).await?;
        debug!(project_id, files = requests.len(), skipped, "downloading project media");

        let mut report = self.download_all(requests, dir).await?;
        report.skipped = skipped;
        Ok(report)
    }

    /// Requests for every image on a defect's overlays: the rendered overlay,
    /// the underlying media file and its thumbnail.
    pub async fn defect_overlay_requests(&self, defect_id: &str) -> MediaResult<Vec<MediaRequest>> {
        let defect_type = EntityType::DEFECT;
        let defect = self
            .cancel
            .run(self.fetcher.fetch_one(&defect_type, defect_id))
            .await?;

        let overlays = defect
            .field("Overlays")
            .and_then(Value::as_list)
            .unwrap_or_default();

        let mut requests = Vec::new();
        for overlay in overlays.iter().filter_map(Value::as_record) {
            let overlay_id = overlay.id().unwrap_or_default();
            if let Some(url) = non_empty(overlay, "DisplayUrl") {
                requests.push(
                    MediaRequest::new(url)
                        .named(format!("defect_{}_overlay_{}.jpg", defect_id, overlay_id)),
                );
            }

            let Some(media) = overlay.field("Media").and_then(Value::as_record) else {
                continue;
            };
            let media_id = media.id().unwrap_or_default();
            if let Some(url) = non_empty(media, "DownloadUrl") {
                let name = non_empty(media, "FileName")
                    .unwrap_or_else(|| format!("defect_{}_media_{}.jpg", defect_id, media_id));
                requests.push(MediaRequest::new(url).named(name));
            }
            if let Some(url) = non_empty(media, "ThumbnailUrl") {
                requests.push(
                    MediaRequest::new(url)
                        .named(format!("defect_{}_media_{}_thumb.jpg", defect_id, media_id)),
                );
            }
        }

        if requests.is_empty() {
            return Err(MediaError::NoImages(format!("defect {}", defect_id)));
        }
        Ok(requests)
    }

    /// Every overlay image of a defect, written into `dir`.
    pub async fn download_defect_overlays(
        &self,
        defect_id: &str,
        dir: &Path,
    ) -> MediaResult<DownloadReport> {
        let requests = self.defect_overlay_requests(defect_id).await?;
        self.download_all(requests, dir).await
    }

    /// Download `requests` at most `max_concurrency` at a time and write them
    /// into `dir` in request order.
    pub async fn download_all(
        &self,
        requests: Vec<MediaRequest>,
        dir: &Path,
    ) -> MediaResult<DownloadReport> {
        fs::create_dir_all(dir).map_err(|source| MediaError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let cancel = &self.cancel;
        let source = self.source.as_ref();
        let mut outcomes: Vec<(usize, FetchResult<Download>)> =
            stream::iter(requests.iter().enumerate())
                .map(|(index, request)| async move {
                    (index, cancel.run(source.download(&request.url)).await)
                })
                .buffer_unordered(self.max_concurrency)
                .collect()
                .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let cancelled = outcomes
            .iter()
            .any(|(_, outcome)| matches!(outcome, Err(e) if e.is_cancelled()));
        if cancelled || self.cancel.is_cancelled() {
            info!("media download cancelled, nothing written");
            return Err(MediaError::Cancelled);
        }

        let mut report = DownloadReport::default();
        let mut used = HashSet::new();
        for (index, outcome) in outcomes {
            let request = &requests[index];
            let failure = |error: String| MediaFailure {
                url: request.url.clone(),
                file_name: request.file_name.clone(),
                error,
            };

            let download = match outcome {
                Ok(download) => download,
                Err(error) => {
                    warn!(url = %request.url, %error, "media download failed, skipping");
                    report.failed.push(failure(error.to_string()));
                    continue;
                }
            };

            let name = claim_file_name(&mut used, file_name_for(request, &download, index));
            let path = dir.join(name);
            match fs::write(&path, &download.bytes) {
                Ok(()) => {
                    debug!(path = %path.display(), size = download.bytes.len(), "wrote media");
                    report.downloaded.push(path);
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "could not write media, skipping");
                    report.failed.push(failure(error.to_string()));
                }
            }
        }

        info!(
            downloaded = report.downloaded.len(),
            failed = report.failed.len(),
            "media download finished"
        );
        Ok(report)
    }
}

fn non_empty(record: &Record, path: &str) -> Option<String> {
    record.key_at(path).filter(|value| !value.trim().is_empty())
}

/// The requested name, else the last URL segment, else `media_<n>`, with an
/// extension from the content type when the name has none.
fn file_name_for(request: &MediaRequest, download: &Download, index: usize) -> String {
    let name = request
        .file_name
        .as_deref()
        .and_then(safe_file_name)
        .or_else(|| name_from_url(&request.url))
        .unwrap_or_else(|| format!("media_{}", index + 1));

    if Path::new(&name).extension().is_some() {
        name
    } else {
        format!("{}{}", name, extension_for(download.content_type.as_deref()))
    }
}

fn name_from_url(url: &str) -> Option<String> {
    let url = reqwest::Url::parse(url).ok()?;
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    safe_file_name(segment)
}

/// The final path component of `name` with unsafe characters replaced.
/// `None` when nothing usable is left.
fn safe_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// `photo.jpg`, then `photo_2.jpg`, `photo_3.jpg`, ... compared
/// case-insensitively.
fn claim_file_name(used: &mut HashSet<String>, name: String) -> String {
    let path = Path::new(&name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.clone());
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut candidate = name.clone();
    let mut n = 2;
    while !used.insert(candidate.to_lowercase()) {
        candidate = format!("{}_{}{}", stem, n, extension);
        n += 1;
    }
    candidate
}

fn extension_for(content_type: Option<&str>) -> &'static str {
    match content_type.map(str::to_lowercase).as_deref() {
        Some("image/png") => ".png",
        Some("image/gif") => ".gif",
        Some("image/bmp") => ".bmp",
        Some("image/webp") => ".webp",
        Some("image/tiff") => ".tiff",
        _ => ".jpg",
    }
}
