//! Row layouts: where each indicator and header field lands on the sheet
//!
//! Built-in layouts describe the teacher observation and admin support
//! templates. Other templates can ship their own layout as TOML:
//!
//! ```toml
//! name = "coaching"
//!
//! [columns]
//! label = "A"
//! description = "B"
//! rating = "C"
//! strengths = "D"
//! growth = "E"
//!
//! [rows]
//! "1a" = 6
//! "1b" = 7
//!
//! [header]
//! teacher_name = "B2"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::request::MergeKind;
use crate::error::MergeError;
use crate::xlsx::reference::column_index;
use crate::xlsx::{CellRef, HorizontalAlignment};

/// The semantic slot a column holds in an indicator row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    Label,
    Description,
    Rating,
    Strengths,
    Growth,
}

impl FieldRole {
    pub const ALL: [FieldRole; 5] = [
        FieldRole::Label,
        FieldRole::Description,
        FieldRole::Rating,
        FieldRole::Strengths,
        FieldRole::Growth,
    ];

    /// Ratings are centred; text columns read left to right.
    pub fn alignment(self) -> HorizontalAlignment {
        match self {
            FieldRole::Rating => HorizontalAlignment::Center,
            _ => HorizontalAlignment::Left,
        }
    }
}

/// 1-based column per role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub label: u32,
    pub description: u32,
    pub rating: u32,
    pub strengths: u32,
    pub growth: u32,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            label: 1,
            description: 2,
            rating: 3,
            strengths: 4,
            growth: 5,
        }
    }
}

impl ColumnMap {
    pub fn column(&self, role: FieldRole) -> u32 {
        match role {
            FieldRole::Label => self.label,
            FieldRole::Description => self.description,
            FieldRole::Rating => self.rating,
            FieldRole::Strengths => self.strengths,
            FieldRole::Growth => self.growth,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowLayout {
    name: String,
    columns: ColumnMap,
    rows: BTreeMap<String, u32>,
    header: BTreeMap<String, CellRef>,
}

/// Keys match regardless of case and surrounding whitespace.
fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

impl RowLayout {
    pub fn new(name: impl Into<String>, columns: ColumnMap) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: BTreeMap::new(),
            header: BTreeMap::new(),
        }
    }

    /// Bind an indicator key to a row. Each key and each row may be used once.
    pub fn insert_row(&mut self, key: &str, row: u32) -> Result<(), MergeError> {
        let key = normalize_key(key);
        if key.is_empty() || row == 0 {
            return Err(MergeError::Configuration(format!(
                "layout '{}': invalid row entry '{key}' = {row}",
                self.name
            )));
        }
        if self.rows.contains_key(&key) {
            return Err(MergeError::Configuration(format!(
                "layout '{}': indicator '{key}' is listed twice",
                self.name
            )));
        }
        if let Some((other, _)) = self.rows.iter().find(|(_, r)| **r == row) {
            return Err(MergeError::Configuration(format!(
                "layout '{}': '{key}' and '{other}' both use row {row}",
                self.name
            )));
        }
        self.rows.insert(key, row);
        Ok(())
    }

    pub fn insert_header(&mut self, key: &str, cell: CellRef) {
        self.header.insert(normalize_key(key), cell);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    pub fn row_for(&self, key: &str) -> Option<u32> {
        self.rows.get(&normalize_key(key)).copied()
    }

    pub fn header_cell(&self, key: &str) -> Option<CellRef> {
        self.header.get(&normalize_key(key)).copied()
    }

    /// Indicator keys in key order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn for_kind(kind: MergeKind) -> Self {
        match kind {
            MergeKind::Teacher => Self::teacher(),
            MergeKind::Admin => Self::admin(),
        }
    }

    /// Four domains of indicators (1a-1f, 2a-2e, 3a-3e, 4a-4f), each domain
    /// below its own heading row.
    pub fn teacher() -> Self {
        let mut layout = Self::new("teacher", ColumnMap::default());
        let domains: [(u32, u8, u32); 4] = [(1, b'f', 6), (2, b'e', 13), (3, b'e', 19), (4, b'f', 25)];
        for (domain, last, first_row) in domains {
            for (offset, letter) in (b'a'..=last).enumerate() {
                let key = format!("{domain}{}", letter as char);
                layout.rows.insert(key, first_row + offset as u32);
            }
        }
        layout.insert_header("teacher_name", CellRef::new(2, 2));
        layout.insert_header("observer", CellRef::new(2, 4));
        layout.insert_header("observation_date", CellRef::new(3, 2));
        layout.insert_header("subject", CellRef::new(3, 4));
        layout
    }

    pub fn admin() -> Self {
        let mut layout = Self::new("admin", ColumnMap::default());
        let keys = [
            "planning",
            "environment",
            "instruction",
            "assessment",
            "professionalism",
            "goals",
        ];
        for (offset, key) in keys.iter().enumerate() {
            layout.rows.insert(key.to_string(), 6 + offset as u32);
        }
        layout.insert_header("teacher_name", CellRef::new(2, 2));
        layout.insert_header("support_type", CellRef::new(2, 4));
        layout.insert_header("visit_date", CellRef::new(3, 2));
        layout.insert_header("admin_name", CellRef::new(3, 4));
        layout
    }

    pub fn from_toml(text: &str) -> Result<Self, MergeError> {
        let file: LayoutFile = toml::from_str(text)
            .map_err(|e| MergeError::Configuration(format!("invalid layout file: {e}")))?;

        let name = file.name.unwrap_or_else(|| "custom".to_string());
        let letter = |role: &str, letters: &str| {
            column_index(letters.trim()).ok_or_else(|| {
                MergeError::Configuration(format!(
                    "layout '{name}': column for {role} is not a column letter: '{letters}'"
                ))
            })
        };
        let columns = ColumnMap {
            label: letter("label", &file.columns.label)?,
            description: letter("description", &file.columns.description)?,
            rating: letter("rating", &file.columns.rating)?,
            strengths: letter("strengths", &file.columns.strengths)?,
            growth: letter("growth", &file.columns.growth)?,
        };

        let mut layout = Self::new(name, columns);
        for (key, row) in &file.rows {
            layout.insert_row(key, *row)?;
        }
        for (key, cell) in &file.header {
            let at = CellRef::parse(cell).map_err(|_| {
                MergeError::Configuration(format!(
                    "layout '{}': header '{key}' is not a cell reference: '{cell}'",
                    layout.name
                ))
            })?;
            layout.insert_header(key, at);
        }
        if layout.is_empty() {
            return Err(MergeError::Configuration(format!(
                "layout '{}' has no rows",
                layout.name
            )));
        }
        Ok(layout)
    }

    pub fn load(path: &Path) -> Result<Self, MergeError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            MergeError::Configuration(format!("failed to read layout {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutFile {
    name: Option<String>,
    #[serde(default)]
    columns: ColumnsFile,
    #[serde(default)]
    rows: BTreeMap<String, u32>,
    #[serde(default)]
    header: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ColumnsFile {
    label: String,
    description: String,
    rating: String,
    strengths: String,
    growth: String,
}

impl Default for ColumnsFile {
    fn default() -> Self {
        Self {
            label: "A".to_string(),
            description: "B".to_string(),
            rating: "C".to_string(),
            strengths: "D".to_string(),
            growth: "E".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teacher_layout_rows() {
        let layout = RowLayout::teacher();
        assert_eq!(layout.len(), 22);
        assert_eq!(layout.row_for("1a"), Some(6));
        assert_eq!(layout.row_for("1F"), Some(11));
        assert_eq!(layout.row_for("2a"), Some(13));
        assert_eq!(layout.row_for("3e"), Some(23));
        assert_eq!(layout.row_for("4f"), Some(30));
        assert_eq!(layout.row_for("5a"), None);
        assert_eq!(layout.header_cell("teacher_name"), Some(CellRef::new(2, 2)));
    }

    #[test]
    fn test_admin_layout_rows() {
        let layout = RowLayout::for_kind(MergeKind::Admin);
        assert_eq!(layout.name(), "admin");
        assert_eq!(layout.row_for("planning"), Some(6));
        assert_eq!(layout.row_for("goals"), Some(11));
        assert_eq!(layout.header_cell("visit_date"), Some(CellRef::new(3, 2)));
    }

    #[test]
    fn test_built_in_rows_are_unique() {
        for layout in [RowLayout::teacher(), RowLayout::admin()] {
            let mut rows: Vec<u32> = layout.keys().filter_map(|k| layout.row_for(k)).collect();
            let total = rows.len();
            rows.sort_unstable();
            rows.dedup();
            assert_eq!(rows.len(), total, "{}", layout.name());
        }
    }

    #[test]
    fn test_role_alignment() {
        assert_eq!(FieldRole::Rating.alignment(), HorizontalAlignment::Center);
        assert_eq!(FieldRole::Growth.alignment(), HorizontalAlignment::Left);
        assert_eq!(ColumnMap::default().column(FieldRole::Strengths), 4);
    }

    #[test]
    fn test_from_toml() {
        let layout = RowLayout::from_toml(
            r#"
name = "coaching"

[columns]
rating = "F"

[rows]
"Goal 1" = 8
"goal 2" = 9

[header]
coach = "C2"
"#,
        )
        .unwrap();

        assert_eq!(layout.name(), "coaching");
        assert_eq!(layout.columns().rating, 6);
        assert_eq!(layout.columns().label, 1);
        assert_eq!(layout.row_for("goal 1"), Some(8));
        assert_eq!(layout.header_cell("Coach"), Some(CellRef::new(2, 3)));
    }

    #[test]
    fn test_from_toml_rejects_shared_rows_and_bad_columns() {
        let shared = RowLayout::from_toml("[rows]\na = 6\nb = 6\n").unwrap_err();
        assert!(shared.to_string().contains("row 6"), "{shared}");

        let bad_column = RowLayout::from_toml("[columns]\nrating = \"C3\"\n[rows]\na = 6\n");
        assert!(matches!(bad_column, Err(MergeError::Configuration(_))));

        let empty = RowLayout::from_toml("name = \"x\"\n");
        assert!(matches!(empty, Err(MergeError::Configuration(_))));
    }
}
