//! In-memory media source for fixtures and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Download, MediaSource};
use crate::fetch::{FetchError, FetchResult};

/// Serves fixed bytes per URL; any other URL answers 404.
#[derive(Debug, Default)]
pub struct InMemoryMediaSource {
    files: HashMap<String, Download>,
    requested: Mutex<Vec<String>>,
}

impl InMemoryMediaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(
        mut self,
        url: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        content_type: Option<&str>,
    ) -> Self {
        self.files.insert(
            url.into(),
            Download {
                bytes: bytes.into(),
                content_type: content_type.map(str::to_string),
            },
        );
        self
    }

    /// Every URL asked for so far, in call order.
    pub fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl MediaSource for InMemoryMediaSource {
    async fn download(&self, url: &str) -> FetchResult<Download> {
        self.requested
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(url.to_string());

        self.files.get(url).cloned().ok_or_else(|| FetchError::Status {
            status: 404,
            body: format!("no media at {}", url),
        })
    }
}
