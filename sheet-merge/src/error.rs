//! Error kinds a merge can end in
//!
//! Every component reports failures through [`MergeError`] unchanged, so a
//! caller can tell a broken link from a locked file from a missing template.

use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::xlsx::{SheetNameError, XlsxError};

/// Stable classification of a [`MergeError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Resolution,
    Download,
    TemplateNotFound,
    Locked,
    Upload,
    InvalidSheetName,
    SheetExists,
    InvalidRequest,
    Document,
    Configuration,
}

impl ErrorKind {
    /// Only a lock conflict can succeed when the same request is repeated later.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::Locked)
    }
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("failed to resolve share link ({}): {message}", describe(.status))]
    Resolution {
        status: Option<StatusCode>,
        message: String,
    },
    #[error("failed to download document ({}): {message}", describe(.status))]
    Download {
        status: Option<StatusCode>,
        message: String,
    },
    #[error("template sheet '{0}' not found")]
    TemplateNotFound(String),
    #[error("document is locked ({status}) after {attempts} upload attempts")]
    Locked { attempts: u32, status: StatusCode },
    #[error("failed to upload document ({}): {message}", describe(.status))]
    Upload {
        status: Option<StatusCode>,
        message: String,
    },
    #[error("invalid sheet name '{name}': {source}")]
    InvalidSheetName {
        name: String,
        #[source]
        source: SheetNameError,
    },
    #[error("sheet '{0}' already exists")]
    SheetExists(String),
    #[error("invalid merge request: {0}")]
    InvalidRequest(String),
    #[error("document error: {0}")]
    Document(#[source] XlsxError),
    #[error("configuration error: {0}")]
    Configuration(String),
}

fn describe(status: &Option<StatusCode>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "no response".to_string(),
    }
}

impl MergeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MergeError::Resolution { .. } => ErrorKind::Resolution,
            MergeError::Download { .. } => ErrorKind::Download,
            MergeError::TemplateNotFound(_) => ErrorKind::TemplateNotFound,
            MergeError::Locked { .. } => ErrorKind::Locked,
            MergeError::Upload { .. } => ErrorKind::Upload,
            MergeError::InvalidSheetName { .. } => ErrorKind::InvalidSheetName,
            MergeError::SheetExists(_) => ErrorKind::SheetExists,
            MergeError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            MergeError::Document(_) => ErrorKind::Document,
            MergeError::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// HTTP status behind the failure, when there was one
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            MergeError::Resolution { status, .. }
            | MergeError::Download { status, .. }
            | MergeError::Upload { status, .. } => *status,
            MergeError::Locked { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Text to show the person who asked for the merge.
    pub fn user_message(&self) -> String {
        match self {
            MergeError::Resolution { .. } => {
                "The spreadsheet link could not be opened. Check that the link is correct and still shared with you.".to_string()
            }
            MergeError::Download { .. } => {
                "The spreadsheet could not be downloaded. Check that you still have access to it.".to_string()
            }
            MergeError::TemplateNotFound(name) => {
                format!("The spreadsheet has no sheet named '{name}' to copy. Ask an administrator to restore the template.")
            }
            MergeError::Locked { .. } => {
                "The spreadsheet is open somewhere else. Close it everywhere and try again.".to_string()
            }
            MergeError::Upload { .. } => "The updated spreadsheet could not be saved.".to_string(),
            MergeError::InvalidSheetName { name, source } => {
                format!("'{name}' cannot be used as a sheet name: {source}.")
            }
            MergeError::SheetExists(name) => {
                format!("The spreadsheet already has a sheet named '{name}'.")
            }
            MergeError::InvalidRequest(message) => message.clone(),
            MergeError::Document(_) => "The spreadsheet file could not be read.".to_string(),
            MergeError::Configuration(message) => message.clone(),
        }
    }
}

impl From<XlsxError> for MergeError {
    fn from(err: XlsxError) -> Self {
        match err {
            XlsxError::DuplicateSheet(name) => MergeError::SheetExists(name),
            XlsxError::SheetName { name, source } => MergeError::InvalidSheetName { name, source },
            other => MergeError::Document(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_errors_map_to_merge_kinds() {
        let err: MergeError = XlsxError::DuplicateSheet("03.2025".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::SheetExists);

        let err: MergeError = XlsxError::SheetName {
            name: "a/b".to_string(),
            source: SheetNameError::ForbiddenChar('/'),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidSheetName);

        let err: MergeError = XlsxError::MissingPart("xl/workbook.xml".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Document);
    }

    #[test]
    fn test_locked_message_asks_to_close_file() {
        let err = MergeError::Locked {
            attempts: 3,
            status: StatusCode::LOCKED,
        };
        assert!(err.kind().is_transient());
        assert_eq!(err.status(), Some(StatusCode::LOCKED));
        assert!(err.user_message().contains("Close it"));
        assert_eq!(
            err.to_string(),
            "document is locked (423 Locked) after 3 upload attempts"
        );
    }

    #[test]
    fn test_display_without_status() {
        let err = MergeError::Download {
            status: None,
            message: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to download document (no response): connection refused"
        );
        assert!(!err.kind().is_transient());
    }
}
