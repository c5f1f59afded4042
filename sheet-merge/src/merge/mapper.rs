//! Writes export values into a cloned sheet following a [`RowLayout`]
//!
//! Only values and alignment change. Font, fill and border come from the
//! template's cell format, which is re-derived with the new alignment.

use log::{debug, warn};
use serde::Serialize;

use super::layout::{FieldRole, RowLayout};
use super::request::ExportModel;
use crate::error::MergeError;
use crate::xlsx::{CellRef, CellValue, HorizontalAlignment, Sheet, Styles, Workbook};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingReport {
    pub written_cells: usize,
    /// Keys in the model the layout has no cell for, in key order
    pub skipped_keys: Vec<String>,
}

pub fn apply_layout(
    workbook: &mut Workbook,
    sheet_name: &str,
    layout: &RowLayout,
    model: &ExportModel,
) -> Result<MappingReport, MergeError> {
    let (sheet, mut styles) = workbook.sheet_and_styles_mut(sheet_name).ok_or_else(|| {
        MergeError::InvalidRequest(format!("no worksheet named '{sheet_name}' to map into"))
    })?;
    let mut report = MappingReport::default();

    for (key, value) in &model.header {
        let value = value.trim();
        let Some(at) = layout.header_cell(key) else {
            warn!("Layout '{}' has no cell for header field '{key}'", layout.name());
            report.skipped_keys.push(key.clone());
            continue;
        };
        if value.is_empty() {
            continue;
        }
        write(
            sheet,
            styles.as_deref_mut(),
            at,
            HorizontalAlignment::Left,
            CellValue::text(value),
        );
        report.written_cells += 1;
    }

    for (key, values) in &model.indicators {
        let Some(row) = layout.row_for(key) else {
            warn!("Layout '{}' has no row for indicator '{key}', skipping", layout.name());
            report.skipped_keys.push(key.clone());
            continue;
        };
        for role in FieldRole::ALL {
            if let Some(value) = values.value(role) {
                let at = CellRef::new(row, layout.columns().column(role));
                write(sheet, styles.as_deref_mut(), at, role.alignment(), value);
                report.written_cells += 1;
            }
        }
    }

    sheet.refresh_dimension();
    debug!(
        "Mapped {} cells onto '{sheet_name}' ({} keys skipped)",
        report.written_cells,
        report.skipped_keys.len()
    );
    Ok(report)
}

/// Without a stylesheet the cell keeps the format index it already has.
fn write(
    sheet: &mut Sheet,
    styles: Option<&mut Styles>,
    at: CellRef,
    horizontal: HorizontalAlignment,
    value: CellValue,
) {
    let cell = sheet.cell_mut(at);
    if let Some(styles) = styles {
        cell.style = styles.aligned(cell.style, horizontal, true);
    }
    cell.set_value(value);
}
