//! Microsoft Graph drive client
//!
//! One `reqwest::Client` is built per `GraphClient` and reused for every call.
//! The caller passes the bearer token on each request.

use async_trait::async_trait;
use log::{debug, info};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;

use super::resilience::{RetryConfig, RetryOutcome, RetryPolicy};
use super::share::{DriveItemRef, DriveItemResponse, encode_share_token};
use super::store::{AccessToken, DocumentStore, UploadOutcome};
use crate::config::MergeConfig;
use crate::error::MergeError;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Longest server message carried into an error
const MAX_ERROR_TEXT: usize = 300;

#[derive(Debug, Clone)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl GraphClient {
    pub fn new(config: &MergeConfig) -> Result<Self, MergeError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| MergeError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http_client(
            http,
            &config.graph_base_url,
            config.retry.clone(),
        ))
    }

    pub fn with_http_client(http: reqwest::Client, base_url: &str, retry: RetryConfig) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::new(retry),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn share_url(&self, share_url: &str) -> String {
        format!(
            "{}/shares/{}/driveItem",
            self.base_url,
            encode_share_token(share_url)
        )
    }

    fn content_url(&self, item: &DriveItemRef) -> String {
        format!(
            "{}/drives/{}/items/{}/content",
            self.base_url,
            urlencoding::encode(&item.drive_id),
            urlencoding::encode(&item.item_id)
        )
    }
}

#[async_trait]
impl DocumentStore for GraphClient {
    async fn resolve_share(
        &self,
        share_url: &str,
        token: &AccessToken,
    ) -> Result<DriveItemRef, MergeError> {
        let url = self.share_url(share_url);
        debug!("GET {url}");
        let resolution = |status: Option<StatusCode>, message: String| MergeError::Resolution {
            status,
            message,
        };

        let response = self
            .http
            .get(&url)
            .bearer_auth(token.secret())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| resolution(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(resolution(Some(status), error_text(&body)));
        }

        let item: DriveItemResponse = response
            .json()
            .await
            .map_err(|e| resolution(Some(status), format!("unexpected response body: {e}")))?;
        let item = item.into_ref().ok_or_else(|| {
            resolution(
                Some(status),
                "response did not identify a drive and item".to_string(),
            )
        })?;
        debug!("Share link resolved to drive {} item {}", item.drive_id, item.item_id);
        Ok(item)
    }

    async fn download(
        &self,
        item: &DriveItemRef,
        token: &AccessToken,
    ) -> Result<Vec<u8>, MergeError> {
        let url = self.content_url(item);
        debug!("GET {url}");
        let download = |status: Option<StatusCode>, message: String| MergeError::Download {
            status,
            message,
        };

        let response = self
            .http
            .get(&url)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|e| download(None, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(download(Some(status), error_text(&body)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| download(Some(status), e.to_string()))?;
        debug!("Downloaded {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }

    async fn upload(
        &self,
        item: &DriveItemRef,
        bytes: Vec<u8>,
        token: &AccessToken,
    ) -> Result<UploadOutcome, MergeError> {
        let url = self.content_url(item);
        let size = bytes.len();

        let outcome = self
            .retry
            .execute(|attempt| {
                debug!("PUT {url} ({size} bytes, attempt {attempt})");
                self.http
                    .put(&url)
                    .bearer_auth(token.secret())
                    .header(CONTENT_TYPE, XLSX_CONTENT_TYPE)
                    .body(bytes.clone())
                    .send()
            })
            .await
            .map_err(|e| MergeError::Upload {
                status: None,
                message: e.to_string(),
            })?;

        match outcome {
            RetryOutcome::Completed { response, attempts } => {
                let status = response.status();
                if status.is_success() {
                    info!("Uploaded {size} bytes ({status}, {attempts} attempt(s))");
                    return Ok(UploadOutcome { status, attempts });
                }
                let body = response.text().await.unwrap_or_default();
                Err(MergeError::Upload {
                    status: Some(status),
                    message: error_text(&body),
                })
            }
            RetryOutcome::Exhausted { last, attempts } => Err(MergeError::Locked {
                attempts,
                status: last.status(),
            }),
        }
    }
}

/// The `error.message` of a Graph error body, or the start of the raw body.
fn error_text(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string));
    let text = match message {
        Some(message) => message,
        None if body.trim().is_empty() => return "empty response".to_string(),
        None => body.trim().to_string(),
    };
    match text.char_indices().nth(MAX_ERROR_TEXT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text,
    }
}
