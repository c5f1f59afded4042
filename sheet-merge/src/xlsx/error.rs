use thiserror::Error;

use super::sheet_name::SheetNameError;

/// Errors raised while reading or writing a SpreadsheetML package
#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error in {part}: {source}")]
    Xml {
        part: String,
        #[source]
        source: roxmltree::Error,
    },
    #[error("{0} is not valid utf-8")]
    Utf8(String),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("invalid cell reference: {0}")]
    InvalidReference(String),
    #[error("invalid xlsx: {0}")]
    Invalid(String),
    #[error("xlsx part {part} is too large to load ({size} bytes, max {max})")]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("a sheet named '{0}' already exists")]
    DuplicateSheet(String),
    #[error("invalid sheet name '{name}': {source}")]
    SheetName {
        name: String,
        #[source]
        source: SheetNameError,
    },
}
