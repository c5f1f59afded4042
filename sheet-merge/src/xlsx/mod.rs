//! SpreadsheetML reading and writing
//!
//! The codec works on the package as a set of parts and only rewrites what it
//! changes, so features it does not understand survive a load/save cycle.

mod error;
mod package;
pub mod reference;
pub mod sheet_name;
pub mod styles;
pub mod workbook;
pub mod worksheet;
mod xml;

pub use error::XlsxError;
pub use reference::{CellRange, CellRef};
pub use sheet_name::SheetNameError;
pub use styles::{HorizontalAlignment, Styles};
pub use workbook::Workbook;
pub use worksheet::{Cell, CellValue, Sheet};
