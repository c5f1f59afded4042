//! Template-preserving spreadsheet merge
//!
//! Clones a styled template sheet inside an `.xlsx` workbook stored on
//! OneDrive or SharePoint, fills the copy with observation data, and uploads
//! the workbook again. Every other part of the document is kept as it was.

pub mod api;
pub mod config;
pub mod error;
pub mod merge;
pub mod xlsx;

pub use api::{AccessToken, DocumentStore, DriveItemRef, GraphClient};
pub use config::MergeConfig;
pub use error::{ErrorKind, MergeError};
pub use merge::{ExportModel, MergeKind, MergeRequest, MergeResult, Merger};
