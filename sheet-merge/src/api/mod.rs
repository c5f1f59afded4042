//! Document storage access
//!
//! Resolving share links, downloading and uploading workbooks through the
//! Microsoft Graph drive API.

pub mod client;
pub mod resilience;
pub mod share;
pub mod store;

pub use client::GraphClient;
pub use resilience::{RetryConfig, RetryPolicy};
pub use share::{DriveItemRef, encode_share_token};
pub use store::{AccessToken, DocumentStore, UploadOutcome};
