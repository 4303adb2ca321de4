//! REST implementation of the fetch port.
//!
//! Authenticates with a client-credentials token (`Authorization: Token ..`),
//! refreshes it shortly before expiry, and walks `limit`/`offset` pages until
//! the backend stops returning a `next` link.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{EntityFetcher, FetchError, FetchResult, Filters};
use crate::catalog::EntityType;
use crate::config::ApiSettings;
use crate::record::Record;

const TOKEN_PATH: &str = "/api/auth/obtain-access-token/";

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// One page of a list endpoint.
#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    results: Vec<serde_json::Value>,
    #[serde(default)]
    next: Option<String>,
}

/// Fetcher backed by the inspection platform's REST API.
pub struct HttpEntityFetcher {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    refresh_buffer: Duration,
    page_size: usize,
    max_pages: usize,
    token: Mutex<Option<AccessToken>>,
}

impl HttpEntityFetcher {
    pub fn new(settings: &ApiSettings) -> FetchResult<Self> {
        settings
            .validate()
            .map_err(|err| FetchError::Config(err.to_string()))?;
        let client_id = settings
            .resolved_client_id()
            .map_err(|err| FetchError::Config(err.to_string()))?;
        let client_secret = settings
            .resolved_client_secret()
            .map_err(|err| FetchError::Config(err.to_string()))?;

        let client = Client::builder().timeout(settings.timeout()).build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            refresh_buffer: settings.refresh_buffer(),
            page_size: settings.page_size,
            max_pages: settings.max_pages,
            token: Mutex::new(None),
        })
    }

    /// The current token, fetching a new one when missing, near expiry, or
    /// when `force` is set after a rejected request.
    async fn access_token(&self, force: bool) -> FetchResult<String> {
        let mut slot = self.token.lock().await;
        if !force {
            if let Some(token) = slot.as_ref() {
                if Instant::now() + self.refresh_buffer < token.expires_at {
                    return Ok(token.value.clone());
                }
            }
        }

        let token = self.obtain_token().await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    async fn obtain_token(&self) -> FetchResult<AccessToken> {
        debug!("requesting access token");
        let response = self
            .client
            .post(format!("{}{}", self.base_url, TOKEN_PATH))
            .json(&serde_json::json!({
                "client_id": self.client_id,
                "client_secret": self.client_secret,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Auth(format!("token request returned {}: {}", status, body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| FetchError::Auth(format!("malformed token response: {}", err)))?;
        let lifetime = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);

        Ok(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }

    async fn send_get(
        &self,
        url: &str,
        query: &[(String, String)],
        force_token: bool,
    ) -> FetchResult<Response> {
        let token = self.access_token(force_token).await?;
        Ok(self
            .client
            .get(url)
            .query(query)
            .header(AUTHORIZATION, format!("Token {}", token))
            .send()
            .await?)
    }

    /// GET a JSON document, retrying once with a fresh token on 401.
    async fn get_json(&self, url: &str, query: &[(String, String)]) -> FetchResult<serde_json::Value> {
        let mut response = self.send_get(url, query, false).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(url, "token rejected, retrying with a fresh one");
            response = self.send_get(url, query, true).await?;
        }

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(FetchError::Auth("credentials rejected by backend".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    fn collection_url(&self, entity_type: &EntityType) -> FetchResult<String> {
        Ok(format!("{}/api/{}/", self.base_url, endpoint(entity_type)?))
    }

    /// `<collection>/<id>/`, with `id` escaped as a single path segment.
    fn item_url(&self, entity_type: &EntityType, id: &str) -> FetchResult<Url> {
        let collection = self.collection_url(entity_type)?;
        let mut url = Url::parse(&collection)
            .map_err(|err| FetchError::Config(format!("invalid base url {}: {}", collection, err)))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Config(format!("base url cannot hold a path: {}", collection)))?
            .pop_if_empty()
            .push(id)
            .push("");
        Ok(url)
    }
}

/// REST path segment for each entity type.
fn endpoint(entity_type: &EntityType) -> FetchResult<&'static str> {
    let path = match entity_type.as_str() {
        "Asset" => "assets",
        "Project" => "projects",
        "InspectionMedia" => "inspection-media",
        "Checklist" => "checklists",
        "Defect" => "defects",
        "Measurement" => "measurements",
        "User" => "users",
        "Workspace" => "workspaces",
        "Task" => "tasks",
        "Library" => "libraries",
        "LibraryMedia" => "library-media",
        "DefectOverlay" => "defect-overlays",
        _ => return Err(FetchError::UnknownEntityType(entity_type.clone())),
    };
    Ok(path)
}

fn into_record(json: serde_json::Value) -> FetchResult<Record> {
    Record::from_api_json(json)
        .ok_or_else(|| FetchError::Decode("expected a JSON object".to_string()))
}

#[async_trait]
impl EntityFetcher for HttpEntityFetcher {
    async fn fetch_all(
        &self,
        entity_type: &EntityType,
        filters: &Filters,
    ) -> FetchResult<Vec<Record>> {
        let url = self.collection_url(entity_type)?;
        let mut records = Vec::new();
        let mut offset = 0;

        for page_number in 1..=self.max_pages {
            let mut query: Vec<(String, String)> = filters
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            query.push(("limit".to_string(), self.page_size.to_string()));
            query.push(("offset".to_string(), offset.to_string()));

            let body = self.get_json(&url, &query).await?;

            // Some endpoints return a bare array instead of a page envelope
            if let serde_json::Value::Array(items) = body {
                for item in items {
                    records.push(into_record(item)?);
                }
                break;
            }

            let page: Page = serde_json::from_value(body)?;
            let received = page.results.len();
            for item in page.results {
                records.push(into_record(item)?);
            }
            debug!(%entity_type, page = page_number, received, "fetched page");

            if page.next.is_none() || received == 0 {
                break;
            }
            if page_number == self.max_pages {
                warn!(%entity_type, max_pages = self.max_pages, "page limit reached, result truncated");
            }
            offset += received;
        }

        debug!(%entity_type, count = records.len(), "fetched collection");
        Ok(records)
    }

    async fn fetch_one(&self, entity_type: &EntityType, id: &str) -> FetchResult<Record> {
        let url = self.item_url(entity_type, id)?;
        match self.get_json(url.as_str(), &[]).await {
            Ok(body) => into_record(body),
            Err(FetchError::Status { status: 404, .. }) => Err(FetchError::not_found(entity_type, id)),
            Err(err) => Err(err),
        }
    }
}
