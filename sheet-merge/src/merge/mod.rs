//! Template clone and merge
//!
//! [`Merger`] runs the whole download, clone, map and upload cycle. The
//! pieces it is made of ([`clone_sheet`], [`apply_layout`]) work on a
//! [`Workbook`](crate::xlsx::Workbook) directly and need no network.

pub mod clone;
pub mod layout;
pub mod mapper;
pub mod orchestrator;
pub mod request;

pub use clone::{CollisionPolicy, clone_sheet, clone_sheet_with};
pub use layout::{ColumnMap, FieldRole, RowLayout};
pub use mapper::{MappingReport, apply_layout};
pub use orchestrator::{MergeStage, MergedDocument, Merger, deep_link};
pub use request::{
    ExportModel, IndicatorValues, MergeInput, MergeKind, MergeRequest, MergeResult, Rating,
};
