//! In-memory workbook
//!
//! A [`Workbook`] keeps every package part as loaded. Worksheets and the
//! stylesheet are parsed into models; on save only the sheets that were
//! changed or added, and the stylesheet if it grew, are written back. Every
//! other part (themes, drawings, printer settings, custom XML, untouched
//! sheets) is re-emitted byte for byte.

use std::collections::HashMap;

use log::debug;
use roxmltree::Node;

use super::package::{self, Package, Relationship};
use super::reference::CellRef;
use super::sheet_name;
use super::styles::Styles;
use super::worksheet::{CellValue, Sheet};
use super::xml::{self, OFFICE_REL_NS};
use super::XlsxError;

const WORKSHEET_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const WORKSHEET_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";

/// `workbook.xml` children that follow `definedNames` in schema order
const AFTER_DEFINED_NAMES: [&str; 12] = [
    "calcPr",
    "oleSize",
    "customWorkbookViews",
    "pivotCaches",
    "smartTagPr",
    "smartTagTypes",
    "webPublishing",
    "fileRecoveryPr",
    "webPublishObjects",
    "extLst",
    "AlternateContent",
    "fileVersion2",
];

#[derive(Debug, Clone)]
struct SheetEntry {
    name: String,
    sheet_id: u32,
    part: String,
    /// `None` for chartsheets and dialog sheets, which are carried but not modelled
    sheet: Option<Sheet>,
    dirty: bool,
}

/// A `<definedName>` from `workbook.xml`
#[derive(Debug, Clone, PartialEq)]
pub struct DefinedName {
    pub name: String,
    /// Position of the sheet this name is scoped to, if any
    pub local_sheet: Option<usize>,
    pub formula: String,
    attrs: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct Workbook {
    package: Package,
    workbook_part: String,
    sheets: Vec<SheetEntry>,
    styles: Styles,
    styles_part: Option<String>,
    shared_strings: Vec<String>,
}

impl Workbook {
    pub fn parse(bytes: &[u8]) -> Result<Self, XlsxError> {
        let package = Package::from_bytes(bytes)?;
        let workbook_part = package.workbook_part()?;
        let rels_part = package::rels_part_for(&workbook_part);
        let rels = package::parse_relationships(package.require_text(&rels_part)?, &rels_part)?;
        let by_id: HashMap<&str, &Relationship> = rels.iter().map(|r| (r.id.as_str(), r)).collect();

        let mut sheets = Vec::new();
        {
            let text = package.require_text(&workbook_part)?;
            let doc = xml::parse_document(text, &workbook_part)?;
            let declared = xml::child(doc.root_element(), "sheets")
                .ok_or_else(|| XlsxError::Invalid(format!("{workbook_part} has no <sheets>")))?;

            for node in xml::children(declared, "sheet") {
                let name = node
                    .attribute("name")
                    .ok_or_else(|| XlsxError::Invalid("sheet without a name".to_string()))?;
                let rel_id = node
                    .attribute((OFFICE_REL_NS, "id"))
                    .ok_or_else(|| XlsxError::Invalid(format!("sheet '{name}' has no r:id")))?;
                let rel = by_id.get(rel_id).ok_or_else(|| {
                    XlsxError::Invalid(format!("sheet '{name}' points at unknown relationship {rel_id}"))
                })?;
                let part = package::resolve_target(&workbook_part, &rel.target);

                let sheet = if rel.rel_type == WORKSHEET_REL {
                    Some(Sheet::parse(package.require_text(&part)?, &part)?)
                } else {
                    None
                };
                sheets.push(SheetEntry {
                    name: name.to_string(),
                    sheet_id: node
                        .attribute("sheetId")
                        .map(|v| xml::parse_num(v, "sheetId"))
                        .transpose()?
                        .unwrap_or(0),
                    part,
                    sheet,
                    dirty: false,
                });
            }
        }

        let related = |suffix: &str| {
            rels.iter()
                .find(|r| r.rel_type.ends_with(suffix))
                .map(|r| package::resolve_target(&workbook_part, &r.target))
        };

        let styles_part = related("/styles").filter(|part| package.contains(part));
        let styles = match &styles_part {
            Some(part) => Styles::parse(package.require_text(part)?, part)?,
            None => Styles::default(),
        };

        let shared_strings = match related("/sharedStrings").filter(|part| package.contains(part)) {
            Some(part) => parse_shared_strings(package.require_text(&part)?, &part)?,
            None => Vec::new(),
        };

        debug!(
            "Loaded workbook with {} sheets, {} shared strings",
            sheets.len(),
            shared_strings.len()
        );

        Ok(Self {
            package,
            workbook_part,
            sheets,
            styles,
            styles_part,
            shared_strings,
        })
    }

    /// Package bytes with changed sheets and styles written back.
    pub fn serialize(&self) -> Result<Vec<u8>, XlsxError> {
        let mut package = self.package.clone();
        for entry in self.sheets.iter().filter(|e| e.dirty) {
            if let Some(sheet) = &entry.sheet {
                debug!("Writing sheet '{}' to {}", entry.name, entry.part);
                package.set_part(entry.part.as_str(), sheet.to_xml().into_bytes());
            }
        }
        if let Some(part) = &self.styles_part {
            if self.styles.is_dirty() {
                let updated = self.styles.apply_to(self.package.require_text(part)?, part)?;
                package.set_part(part.as_str(), updated.into_bytes());
            }
        }
        package.to_bytes()
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|e| e.name.as_str()).collect()
    }

    /// Case-insensitive, as Excel compares sheet names: "Notes" and "NOTES"
    /// count as the same sheet even though a case-sensitive rule would allow both.
    pub fn contains_sheet(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.sheets
            .iter()
            .position(|e| sheet_name::same_name(&e.name, name))
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets[self.position(name)?].sheet.as_ref()
    }

    /// Mutable access marks the sheet for rewriting on save.
    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        let idx = self.position(name)?;
        let entry = &mut self.sheets[idx];
        entry.dirty = true;
        entry.sheet.as_mut()
    }

    /// A sheet and the stylesheet together, for edits that add cell formats.
    /// The stylesheet is `None` when the package has no styles part, since
    /// formats added then would never be written.
    pub fn sheet_and_styles_mut(
        &mut self,
        name: &str,
    ) -> Option<(&mut Sheet, Option<&mut Styles>)> {
        let idx = self.position(name)?;
        let entry = &mut self.sheets[idx];
        entry.dirty = true;
        let styles = self.styles_part.is_some().then_some(&mut self.styles);
        Some((entry.sheet.as_mut()?, styles))
    }

    pub fn styles(&self) -> &Styles {
        &self.styles
    }

    pub fn shared_string(&self, index: usize) -> Option<&str> {
        self.shared_strings.get(index).map(String::as_str)
    }

    /// Display text of a cell, resolving shared strings.
    pub fn cell_text(&self, sheet: &str, at: CellRef) -> Option<String> {
        let value = self.sheet(sheet)?.value_at(at)?;
        match value {
            CellValue::Blank => None,
            CellValue::Number(n) => Some(n.to_string()),
            CellValue::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
            CellValue::SharedString(idx) => self.shared_string(*idx).map(str::to_string),
            CellValue::Text(s)
            | CellValue::FormulaText(s)
            | CellValue::Date(s)
            | CellValue::Error(s) => Some(s.clone()),
        }
    }

    /// Append a worksheet as the last tab.
    pub fn add_sheet(&mut self, name: &str, sheet: Sheet) -> Result<(), XlsxError> {
        sheet_name::validate(name).map_err(|source| XlsxError::SheetName {
            name: name.to_string(),
            source,
        })?;
        if self.contains_sheet(name) {
            return Err(XlsxError::DuplicateSheet(name.to_string()));
        }

        let part = self.package.next_worksheet_part(&self.workbook_part);
        let rel_id = self.add_worksheet_relationship(&part)?;
        self.package.add_override(&part, WORKSHEET_CONTENT_TYPE)?;
        let sheet_id = self.sheets.iter().map(|e| e.sheet_id).max().unwrap_or(0) + 1;
        self.declare_sheet(name, sheet_id, &rel_id)?;

        // Reserve the part name; the final content is written on save.
        self.package.set_part(part.as_str(), sheet.to_xml().into_bytes());
        debug!("Added sheet '{name}' as {part} ({rel_id}, sheetId {sheet_id})");
        self.sheets.push(SheetEntry {
            name: name.to_string(),
            sheet_id,
            part,
            sheet: Some(sheet),
            dirty: true,
        });
        Ok(())
    }

    fn add_worksheet_relationship(&mut self, part: &str) -> Result<String, XlsxError> {
        let rels_part = package::rels_part_for(&self.workbook_part);
        let updated_and_id = {
            let text = self.package.require_text(&rels_part)?;
            let existing = package::parse_relationships(text, &rels_part)?;
            let next = existing
                .iter()
                .filter_map(|r| r.id.strip_prefix("rId")?.parse::<u32>().ok())
                .max()
                .unwrap_or(0)
                + 1;
            let rel_id = (next..)
                .map(|n| format!("rId{n}"))
                .find(|id| existing.iter().all(|r| &r.id != id))
                .unwrap_or_else(|| format!("rId{next}"));

            let doc = xml::parse_document(text, &rels_part)?;
            let root = doc.root_element();
            let prefix = xml::prefix_of(text, root);
            let fragment = format!(
                r#"<{} Id="{rel_id}" Type="{WORKSHEET_REL}" Target="{}"/>"#,
                xml::tag(prefix.as_deref(), "Relationship"),
                xml::escape(&package::relative_target(&self.workbook_part, part))
            );
            (xml::append_child(text, root, &fragment), rel_id)
        };
        let (updated, rel_id) = updated_and_id;
        self.package.set_part(rels_part, updated.into_bytes());
        Ok(rel_id)
    }

    fn declare_sheet(&mut self, name: &str, sheet_id: u32, rel_id: &str) -> Result<(), XlsxError> {
        let updated = {
            let text = self.package.require_text(&self.workbook_part)?;
            let doc = xml::parse_document(text, &self.workbook_part)?;
            let sheets = xml::child(doc.root_element(), "sheets")
                .ok_or_else(|| XlsxError::Invalid("workbook has no <sheets>".to_string()))?;
            let prefix = xml::prefix_of(text, sheets);
            let rel_attr = match sheets.lookup_prefix(OFFICE_REL_NS) {
                Some(p) if !p.is_empty() => format!(r#"{p}:id="{rel_id}""#),
                _ => format!(r#"xmlns:r="{OFFICE_REL_NS}" r:id="{rel_id}""#),
            };
            let fragment = format!(
                r#"<{} name="{}" sheetId="{sheet_id}" {rel_attr}/>"#,
                xml::tag(prefix.as_deref(), "sheet"),
                xml::escape(name)
            );
            xml::append_child(text, sheets, &fragment)
        };
        let part = self.workbook_part.clone();
        self.package.set_part(part, updated.into_bytes());
        Ok(())
    }

    pub fn defined_names(&self) -> Result<Vec<DefinedName>, XlsxError> {
        let text = self.package.require_text(&self.workbook_part)?;
        let doc = xml::parse_document(text, &self.workbook_part)?;
        let Some(names) = xml::child(doc.root_element(), "definedNames") else {
            return Ok(Vec::new());
        };
        xml::children(names, "definedName")
            .map(parse_defined_name)
            .collect()
    }

    /// Copy the names scoped to sheet `from` (print area, print titles, ...)
    /// to sheet `to`, rewriting references to the old sheet. Returns how many
    /// names were copied.
    pub fn copy_local_names(&mut self, from: &str, to: &str) -> Result<usize, XlsxError> {
        let (Some(from_idx), Some(to_idx)) = (self.position(from), self.position(to)) else {
            return Ok(0);
        };
        let from_name = self.sheets[from_idx].name.clone();
        let to_name = self.sheets[to_idx].name.clone();
        let copies: Vec<DefinedName> = self
            .defined_names()?
            .into_iter()
            .filter(|n| n.local_sheet == Some(from_idx))
            .collect();
        if copies.is_empty() {
            return Ok(0);
        }

        let updated = {
            let text = self.package.require_text(&self.workbook_part)?;
            let doc = xml::parse_document(text, &self.workbook_part)?;
            let root = doc.root_element();
            let prefix = xml::prefix_of(text, root);
            let p = prefix.as_deref();

            let mut fragment = String::new();
            for name in &copies {
                fragment.push_str(&format!(
                    r#"<{tag} name="{}" localSheetId="{to_idx}""#,
                    xml::escape(&name.name),
                    tag = xml::tag(p, "definedName")
                ));
                xml::write_attrs(&mut fragment, &name.attrs);
                fragment.push_str(&format!(
                    ">{}</{}>",
                    xml::escape(&retarget_references(&name.formula, &from_name, &to_name)),
                    xml::tag(p, "definedName")
                ));
            }

            match xml::child(root, "definedNames") {
                Some(names) => xml::append_child(text, names, &fragment),
                None => {
                    let block = format!(
                        "<{tag}>{fragment}</{tag}>",
                        tag = xml::tag(p, "definedNames")
                    );
                    match successor(root) {
                        Some(next) => xml::insert_before(text, next, &block),
                        None => xml::append_child(text, root, &block),
                    }
                }
            }
        };
        let part = self.workbook_part.clone();
        self.package.set_part(part, updated.into_bytes());
        Ok(copies.len())
    }
}

fn successor<'a, 'input>(root: Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    root.children()
        .find(|n| n.is_element() && AFTER_DEFINED_NAMES.contains(&n.tag_name().name()))
}

fn parse_defined_name(node: Node) -> Result<DefinedName, XlsxError> {
    let mut name = String::new();
    let mut local_sheet = None;
    let mut attrs = Vec::new();
    for (key, value) in xml::attributes(node) {
        match key.as_str() {
            "name" => name = value,
            "localSheetId" => local_sheet = Some(xml::parse_num(&value, "localSheetId")?),
            _ => attrs.push((key, value)),
        }
    }
    Ok(DefinedName {
        name,
        local_sheet,
        formula: node.text().unwrap_or_default().to_string(),
        attrs,
    })
}

fn parse_shared_strings(text: &str, part: &str) -> Result<Vec<String>, XlsxError> {
    let doc = xml::parse_document(text, part)?;
    Ok(xml::children(doc.root_element(), "si")
        .map(xml::text_runs)
        .collect())
}

/// Point sheet references in a formula at another sheet: `Template!$A$1`
/// and `'Template'!$A$1` both become `'New Name'!$A$1`.
fn retarget_references(formula: &str, from: &str, to: &str) -> String {
    let target = format!("{}!", sheet_name::quote(to));

    let bare = format!("{from}!");
    let mut result = String::with_capacity(formula.len());
    let mut last = 0;
    for (idx, _) in formula.match_indices(&bare) {
        let at_boundary = formula[..idx]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_alphanumeric() || matches!(c, '_' | '.' | '\'')));
        if at_boundary {
            result.push_str(&formula[last..idx]);
            result.push_str(&target);
            last = idx + bare.len();
        }
    }
    result.push_str(&formula[last..]);

    let quoted = format!("{}!", sheet_name::quote(from));
    result.replace(&quoted, &target)
}
