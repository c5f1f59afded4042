//! The document store seam
//!
//! The orchestrator talks to storage through [`DocumentStore`] so the pipeline
//! can run against the Graph API in production and against a scripted store in
//! tests.

use std::fmt;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::share::DriveItemRef;
use crate::error::MergeError;

/// Bearer credential supplied by the caller. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Result<Self, MergeError> {
        let token = token.into();
        let token = token.trim();
        if token.is_empty() {
            return Err(MergeError::InvalidRequest("access token is empty".to_string()));
        }
        Ok(Self(token.strip_prefix("Bearer ").unwrap_or(token).to_string()))
    }

    pub(crate) fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// A successful upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOutcome {
    pub status: StatusCode,
    pub attempts: u32,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Turn a sharing URL into the drive item it points at. Not retried.
    async fn resolve_share(
        &self,
        share_url: &str,
        token: &AccessToken,
    ) -> Result<DriveItemRef, MergeError>;

    /// Raw document bytes. Not retried.
    async fn download(&self, item: &DriveItemRef, token: &AccessToken)
    -> Result<Vec<u8>, MergeError>;

    /// Replace the document content, retrying while the file is locked.
    async fn upload(
        &self,
        item: &DriveItemRef,
        bytes: Vec<u8>,
        token: &AccessToken,
    ) -> Result<UploadOutcome, MergeError>;
}
