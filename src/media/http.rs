//! Plain HTTP media source.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;

use super::{Download, MediaSource};
use crate::fetch::{FetchError, FetchResult};

/// Downloads media over HTTP without credentials.
///
/// Media URLs handed out by the backend are pre-signed, so the API token is
/// not sent with them.
pub struct HttpMediaSource {
    client: Client,
}

impl HttpMediaSource {
    pub fn new(timeout: Duration) -> FetchResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn download(&self, url: &str) -> FetchResult<Download> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string());
        let bytes = response.bytes().await?.to_vec();
        debug!(url, size = bytes.len(), "downloaded media");

        Ok(Download {
            bytes,
            content_type,
        })
    }
}
