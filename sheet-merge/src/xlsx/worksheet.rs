//! Worksheet model
//!
//! A [`Sheet`] holds the parts of a worksheet the merge engine reads or changes
//! (columns, rows and cells, merged ranges, conditional formats, data
//! validations, page margins and setup). Every other child of `<worksheet>` is
//! kept as the exact source text and written back in schema order, so a parsed
//! sheet serializes to an equivalent document.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use roxmltree::Node;

use super::reference::{sqref_contains, CellRange, CellRef};
use super::xml::{self, get_attr, parse_bool, parse_num, tag};
use super::XlsxError;

const DEFAULT_ROOT_TAG: &str = concat!(
    r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#
);

/// Value held by a cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Blank,
    Number(f64),
    Bool(bool),
    /// Inline text
    Text(String),
    /// Index into the workbook's shared string table
    SharedString(usize),
    /// Cached string result of a formula
    FormulaText(String),
    /// ISO 8601 date value
    Date(String),
    Error(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Blank)
    }

    fn type_attr(&self) -> Option<&'static str> {
        match self {
            CellValue::Blank | CellValue::Number(_) => None,
            CellValue::Bool(_) => Some("b"),
            CellValue::Text(_) => Some("inlineStr"),
            CellValue::SharedString(_) => Some("s"),
            CellValue::FormulaText(_) => Some("str"),
            CellValue::Date(_) => Some("d"),
            CellValue::Error(_) => Some("e"),
        }
    }
}

/// A single cell. `style` indexes the workbook's `cellXfs` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub style: u32,
    value: CellValue,
    formula: Option<String>,
    inline_xml: Option<String>,
    extra: Vec<(String, String)>,
}

impl Cell {
    pub fn styled(style: u32) -> Self {
        Self {
            style,
            value: CellValue::Blank,
            formula: None,
            inline_xml: None,
            extra: Vec::new(),
        }
    }

    pub fn value(&self) -> &CellValue {
        &self.value
    }

    /// Replace the value. Any formula is dropped: the cell now holds a constant.
    pub fn set_value(&mut self, value: CellValue) {
        self.value = value;
        self.formula = None;
        self.inline_xml = None;
    }

    /// Raw `<f>` element, if the cell holds a formula
    pub fn formula_xml(&self) -> Option<&str> {
        self.formula.as_deref()
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::styled(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    pub height: Option<f64>,
    pub custom_height: bool,
    pub hidden: bool,
    /// Row-level style; only applies when `custom_format` is set
    pub style: Option<u32>,
    pub custom_format: bool,
    /// Cells keyed by 1-based column index
    pub cells: BTreeMap<u32, Cell>,
    extra: Vec<(String, String)>,
}

impl Row {
    /// Attributes not modelled above (`outlineLevel`, `x14ac:dyDescent`, ...)
    pub fn extra_attributes(&self) -> &[(String, String)] {
        &self.extra
    }
}

/// A `<col>` definition covering columns `min..=max`
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub min: u32,
    pub max: u32,
    pub width: Option<f64>,
    pub style: Option<u32>,
    pub hidden: bool,
    pub custom_width: bool,
    extra: Vec<(String, String)>,
}

impl ColumnDef {
    pub fn new(min: u32, max: u32) -> Self {
        Self {
            min,
            max,
            width: None,
            style: None,
            hidden: false,
            custom_width: false,
            extra: Vec::new(),
        }
    }

    pub fn covers(&self, col: u32) -> bool {
        (self.min..=self.max).contains(&col)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataValidation {
    pub sqref: String,
    /// `list`, `whole`, `decimal`, `date`, `custom`, ...
    pub kind: Option<String>,
    pub formula1: Option<String>,
    pub formula2: Option<String>,
    attrs: Vec<(String, String)>,
}

impl DataValidation {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        get_attr(&self.attrs, name)
    }

    pub fn applies_to(&self, cell: CellRef) -> bool {
        sqref_contains(&self.sqref, cell)
    }

    /// Literal choices of a list validation (`"Yes,No"`). Lists sourced from a
    /// range or a name have no literal choices and return an empty vector.
    pub fn allowed_values(&self) -> Vec<String> {
        if self.kind.as_deref() != Some("list") {
            return Vec::new();
        }
        let Some(formula) = self.formula1.as_deref() else {
            return Vec::new();
        };
        let trimmed = formula.trim();
        match trimmed
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
        {
            Some(inner) => inner
                .replace("\"\"", "\"")
                .split(',')
                .map(|item| item.trim().to_string())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// One `<conditionalFormatting>` block: a range and its ordered rules
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalFormat {
    pub sqref: String,
    pub rules: Vec<ConditionalRule>,
    attrs: Vec<(String, String)>,
    ext: Vec<String>,
}

/// A `<cfRule>`. The rule is kept verbatim; the fields are read from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalRule {
    pub kind: String,
    pub priority: Option<u32>,
    /// Differential format applied when the rule matches
    pub dxf_id: Option<u32>,
    xml: String,
}

impl ConditionalRule {
    pub fn xml(&self) -> &str {
        &self.xml
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageMargins {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
    pub header: f64,
    pub footer: f64,
}

impl Default for PageMargins {
    fn default() -> Self {
        Self {
            left: 0.7,
            right: 0.7,
            top: 0.75,
            bottom: 0.75,
            header: 0.3,
            footer: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Default,
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSetup {
    attrs: Vec<(String, String)>,
}

impl PageSetup {
    pub fn orientation(&self) -> Option<Orientation> {
        match get_attr(&self.attrs, "orientation")? {
            "portrait" => Some(Orientation::Portrait),
            "landscape" => Some(Orientation::Landscape),
            _ => Some(Orientation::Default),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        get_attr(&self.attrs, name)
    }

    /// Copy without the printer-settings relationship, whose part belongs to
    /// the original sheet.
    pub(crate) fn without_relationships(&self) -> Self {
        Self {
            attrs: self
                .attrs
                .iter()
                .filter(|(name, _)| !name.ends_with(":id"))
                .cloned()
                .collect(),
        }
    }
}

/// A worksheet child element the model does not interpret
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RawElement {
    pub name: String,
    pub xml: String,
    pub has_relationship: bool,
    /// For `<hyperlinks>`: the element without the links that need a
    /// relationship, which is what another sheet can take over
    pub portable: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    root_tag: String,
    prefix: Option<String>,
    pub columns: Vec<ColumnDef>,
    /// Rows keyed by 1-based row index
    pub rows: BTreeMap<u32, Row>,
    pub merged: Vec<CellRange>,
    pub conditional_formats: Vec<ConditionalFormat>,
    pub validations: Vec<DataValidation>,
    validations_attrs: Vec<(String, String)>,
    pub page_margins: Option<PageMargins>,
    pub page_setup: Option<PageSetup>,
    extras: Vec<RawElement>,
}

impl Default for Sheet {
    fn default() -> Self {
        Self::new()
    }
}

impl Sheet {
    pub fn new() -> Self {
        Self {
            root_tag: DEFAULT_ROOT_TAG.to_string(),
            prefix: None,
            columns: Vec::new(),
            rows: BTreeMap::new(),
            merged: Vec::new(),
            conditional_formats: Vec::new(),
            validations: Vec::new(),
            validations_attrs: Vec::new(),
            page_margins: None,
            page_setup: None,
            extras: Vec::new(),
        }
    }

    /// An empty sheet using the same root element (namespaces, prefix) as `other`.
    pub(crate) fn empty_like(other: &Sheet) -> Self {
        Self {
            root_tag: other.root_tag.clone(),
            prefix: other.prefix.clone(),
            ..Self::new()
        }
    }

    pub fn parse(text: &str, part: &str) -> Result<Self, XlsxError> {
        let doc = xml::parse_document(text, part)?;
        let root = doc.root_element();
        if root.tag_name().name() != "worksheet" {
            return Err(XlsxError::Invalid(format!("{part} is not a worksheet")));
        }

        let start = root.range().start;
        let mut root_tag = text[start..xml::start_tag_end(text, start)].to_string();
        if let Some(open) = root_tag.strip_suffix("/>") {
            root_tag = format!("{}>", open.trim_end());
        }

        let mut sheet = Sheet {
            root_tag,
            prefix: xml::prefix_of(text, root),
            ..Sheet::new()
        };

        for node in root.children().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                "cols" => sheet.columns = parse_columns(node)?,
                "sheetData" => sheet.rows = parse_rows(text, node)?,
                "mergeCells" => {
                    for merge in xml::children(node, "mergeCell") {
                        if let Some(range) = merge.attribute("ref") {
                            sheet.merged.push(CellRange::parse(range)?);
                        }
                    }
                }
                "conditionalFormatting" => sheet
                    .conditional_formats
                    .push(parse_conditional_format(text, node)?),
                "dataValidations" => {
                    sheet.validations_attrs = xml::attributes(node)
                        .into_iter()
                        .filter(|(name, _)| name != "count")
                        .collect();
                    for validation in xml::children(node, "dataValidation") {
                        sheet.validations.push(parse_validation(validation));
                    }
                }
                "pageMargins" => sheet.page_margins = Some(parse_margins(node)?),
                "pageSetup" => {
                    sheet.page_setup = Some(PageSetup {
                        attrs: xml::attributes(node),
                    })
                }
                name => {
                    let has_relationship = xml::references_relationship(node);
                    let portable = if has_relationship && name == "hyperlinks" {
                        xml::without_relationship_children(text, node)
                    } else {
                        None
                    };
                    sheet.extras.push(RawElement {
                        name: name.to_string(),
                        xml: xml::raw(text, node).to_string(),
                        has_relationship,
                        portable,
                    })
                }
            }
        }

        Ok(sheet)
    }

    pub fn cell(&self, at: CellRef) -> Option<&Cell> {
        self.rows.get(&at.row)?.cells.get(&at.col)
    }

    /// Mutable access to a cell, creating it if missing. A new cell takes the
    /// row's custom format, or failing that the column's style.
    pub fn cell_mut(&mut self, at: CellRef) -> &mut Cell {
        let column_style = self.column(at.col).and_then(|c| c.style);
        let row = self.rows.entry(at.row).or_default();
        let row_style = if row.custom_format { row.style } else { None };
        let style = row_style.or(column_style).unwrap_or(0);
        row.cells.entry(at.col).or_insert_with(|| Cell::styled(style))
    }

    pub fn value_at(&self, at: CellRef) -> Option<&CellValue> {
        self.cell(at).map(Cell::value)
    }

    pub fn column(&self, col: u32) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.covers(col))
    }

    pub fn hidden_columns(&self) -> BTreeSet<u32> {
        self.columns
            .iter()
            .filter(|c| c.hidden)
            .flat_map(|c| c.min..=c.max)
            .collect()
    }

    /// The validation governing a cell, if any. Later rules win, as in Excel.
    pub fn validation_at(&self, at: CellRef) -> Option<&DataValidation> {
        self.validations.iter().rev().find(|v| v.applies_to(at))
    }

    pub fn is_merged(&self, range: &CellRange) -> bool {
        self.merged.contains(range)
    }

    /// Local names of the preserved, uninterpreted child elements
    pub fn preserved_elements(&self) -> impl Iterator<Item = &str> {
        self.extras.iter().map(|e| e.name.as_str())
    }

    pub(crate) fn extras(&self) -> &[RawElement] {
        &self.extras
    }

    pub(crate) fn push_extra(&mut self, element: RawElement) {
        self.extras.push(element);
    }

    pub(crate) fn validations_attrs(&self) -> &[(String, String)] {
        &self.validations_attrs
    }

    pub(crate) fn set_validations_attrs(&mut self, attrs: Vec<(String, String)>) {
        self.validations_attrs = attrs;
    }

    /// Recompute `<dimension>` from the populated cells, if the sheet has one.
    pub fn refresh_dimension(&mut self) {
        let mut bounds: Option<(CellRef, CellRef)> = None;
        for (&row, cells) in self.rows.iter().map(|(r, row)| (r, &row.cells)) {
            for &col in cells.keys() {
                let (lo, hi) = bounds.get_or_insert((CellRef::new(row, col), CellRef::new(row, col)));
                lo.row = lo.row.min(row);
                lo.col = lo.col.min(col);
                hi.row = hi.row.max(row);
                hi.col = hi.col.max(col);
            }
        }
        let range = match bounds {
            Some((lo, hi)) => CellRange::new(lo, hi).to_string(),
            None => "A1".to_string(),
        };
        let element = format!(r#"<{} ref="{range}"/>"#, tag(self.prefix.as_deref(), "dimension"));
        if let Some(existing) = self.extras.iter_mut().find(|e| e.name == "dimension") {
            existing.xml = element;
        }
    }

    pub fn to_xml(&self) -> String {
        let p = self.prefix.as_deref();
        let mut pieces: Vec<(u8, String)> = self
            .extras
            .iter()
            .map(|e| (schema_rank(&e.name), e.xml.clone()))
            .collect();

        if !self.columns.is_empty() {
            pieces.push((schema_rank("cols"), self.columns_xml(p)));
        }
        pieces.push((schema_rank("sheetData"), self.sheet_data_xml(p)));
        if !self.merged.is_empty() {
            pieces.push((schema_rank("mergeCells"), self.merged_xml(p)));
        }
        for format in &self.conditional_formats {
            pieces.push((schema_rank("conditionalFormatting"), conditional_format_xml(p, format)));
        }
        if !self.validations.is_empty() {
            pieces.push((schema_rank("dataValidations"), self.validations_xml(p)));
        }
        if let Some(margins) = &self.page_margins {
            let mut out = String::new();
            let _ = write!(
                out,
                r#"<{} left="{}" right="{}" top="{}" bottom="{}" header="{}" footer="{}"/>"#,
                tag(p, "pageMargins"),
                margins.left,
                margins.right,
                margins.top,
                margins.bottom,
                margins.header,
                margins.footer
            );
            pieces.push((schema_rank("pageMargins"), out));
        }
        if let Some(setup) = &self.page_setup {
            let mut out = format!("<{}", tag(p, "pageSetup"));
            xml::write_attrs(&mut out, &setup.attrs);
            out.push_str("/>");
            pieces.push((schema_rank("pageSetup"), out));
        }

        // Stable: preserved elements sharing a rank keep their source order.
        pieces.sort_by_key(|(rank, _)| *rank);

        let mut out = String::with_capacity(pieces.iter().map(|(_, s)| s.len()).sum::<usize>() + 256);
        out.push_str(xml::XML_DECLARATION);
        out.push('\n');
        out.push_str(&self.root_tag);
        for (_, piece) in pieces {
            out.push_str(&piece);
        }
        let _ = write!(out, "</{}>", tag(p, "worksheet"));
        out
    }

    fn columns_xml(&self, p: Option<&str>) -> String {
        let mut out = format!("<{}>", tag(p, "cols"));
        for col in &self.columns {
            let _ = write!(out, r#"<{} min="{}" max="{}""#, tag(p, "col"), col.min, col.max);
            if let Some(width) = col.width {
                let _ = write!(out, r#" width="{width}""#);
            }
            if let Some(style) = col.style {
                let _ = write!(out, r#" style="{style}""#);
            }
            if col.hidden {
                out.push_str(r#" hidden="1""#);
            }
            if col.custom_width {
                out.push_str(r#" customWidth="1""#);
            }
            xml::write_attrs(&mut out, &col.extra);
            out.push_str("/>");
        }
        let _ = write!(out, "</{}>", tag(p, "cols"));
        out
    }

    fn sheet_data_xml(&self, p: Option<&str>) -> String {
        let mut out = format!("<{}>", tag(p, "sheetData"));
        for (&index, row) in &self.rows {
            let _ = write!(out, r#"<{} r="{index}""#, tag(p, "row"));
            if let Some(style) = row.style {
                let _ = write!(out, r#" s="{style}""#);
            }
            if row.custom_format {
                out.push_str(r#" customFormat="1""#);
            }
            if let Some(height) = row.height {
                let _ = write!(out, r#" ht="{height}""#);
            }
            if row.hidden {
                out.push_str(r#" hidden="1""#);
            }
            if row.custom_height {
                out.push_str(r#" customHeight="1""#);
            }
            xml::write_attrs(&mut out, &row.extra);
            if row.cells.is_empty() {
                out.push_str("/>");
                continue;
            }
            out.push('>');
            for (&col, cell) in &row.cells {
                write_cell(&mut out, p, CellRef::new(index, col), cell);
            }
            let _ = write!(out, "</{}>", tag(p, "row"));
        }
        let _ = write!(out, "</{}>", tag(p, "sheetData"));
        out
    }

    fn merged_xml(&self, p: Option<&str>) -> String {
        let mut out = format!(r#"<{} count="{}">"#, tag(p, "mergeCells"), self.merged.len());
        for range in &self.merged {
            let _ = write!(out, r#"<{} ref="{range}"/>"#, tag(p, "mergeCell"));
        }
        let _ = write!(out, "</{}>", tag(p, "mergeCells"));
        out
    }

    fn validations_xml(&self, p: Option<&str>) -> String {
        let mut out = format!(r#"<{} count="{}""#, tag(p, "dataValidations"), self.validations.len());
        xml::write_attrs(&mut out, &self.validations_attrs);
        out.push('>');
        for validation in &self.validations {
            let _ = write!(out, "<{}", tag(p, "dataValidation"));
            if let Some(kind) = &validation.kind {
                let _ = write!(out, r#" type="{}""#, xml::escape(kind));
            }
            xml::write_attrs(&mut out, &validation.attrs);
            let _ = write!(out, r#" sqref="{}">"#, xml::escape(&validation.sqref));
            for (name, formula) in [
                ("formula1", &validation.formula1),
                ("formula2", &validation.formula2),
            ] {
                if let Some(formula) = formula {
                    let name = tag(p, name);
                    let _ = write!(out, "<{name}>{}</{name}>", xml::escape(formula));
                }
            }
            let _ = write!(out, "</{}>", tag(p, "dataValidation"));
        }
        let _ = write!(out, "</{}>", tag(p, "dataValidations"));
        out
    }
}

fn conditional_format_xml(p: Option<&str>, format: &ConditionalFormat) -> String {
    let mut out = format!("<{}", tag(p, "conditionalFormatting"));
    xml::write_attrs(&mut out, &format.attrs);
    let _ = write!(out, r#" sqref="{}">"#, xml::escape(&format.sqref));
    for rule in &format.rules {
        out.push_str(&rule.xml);
    }
    for ext in &format.ext {
        out.push_str(ext);
    }
    let _ = write!(out, "</{}>", tag(p, "conditionalFormatting"));
    out
}

fn write_cell(out: &mut String, p: Option<&str>, at: CellRef, cell: &Cell) {
    let _ = write!(out, r#"<{} r="{at}""#, tag(p, "c"));
    if cell.style != 0 {
        let _ = write!(out, r#" s="{}""#, cell.style);
    }
    if let Some(t) = cell.value.type_attr() {
        let _ = write!(out, r#" t="{t}""#);
    }
    xml::write_attrs(out, &cell.extra);

    let mut body = String::new();
    if let Some(formula) = &cell.formula {
        body.push_str(formula);
    }
    let v = tag(p, "v");
    match &cell.value {
        CellValue::Blank => {}
        CellValue::Number(n) => {
            let _ = write!(body, "<{v}>{n}</{v}>");
        }
        CellValue::Bool(b) => {
            let _ = write!(body, "<{v}>{}</{v}>", u8::from(*b));
        }
        CellValue::SharedString(idx) => {
            let _ = write!(body, "<{v}>{idx}</{v}>");
        }
        CellValue::FormulaText(s) | CellValue::Date(s) | CellValue::Error(s) => {
            let _ = write!(body, "<{v}>{}</{v}>", xml::escape(s));
        }
        CellValue::Text(s) => match &cell.inline_xml {
            Some(raw) => body.push_str(raw),
            None => {
                let _ = write!(
                    body,
                    r#"<{is}><{t} xml:space="preserve">{}</{t}></{is}>"#,
                    xml::escape(s),
                    is = tag(p, "is"),
                    t = tag(p, "t")
                );
            }
        },
    }

    if body.is_empty() {
        out.push_str("/>");
    } else {
        out.push('>');
        out.push_str(&body);
        let _ = write!(out, "</{}>", tag(p, "c"));
    }
}

/// Position of a worksheet child in the CT_Worksheet sequence.
fn schema_rank(name: &str) -> u8 {
    match name {
        "sheetPr" => 0,
        "dimension" => 1,
        "sheetViews" => 2,
        "sheetFormatPr" => 3,
        "cols" => 4,
        "sheetData" => 5,
        "sheetCalcPr" => 6,
        "sheetProtection" => 7,
        "protectedRanges" => 8,
        "scenarios" => 9,
        "autoFilter" => 10,
        "sortState" => 11,
        "dataConsolidate" => 12,
        "customSheetViews" => 13,
        "mergeCells" => 14,
        "phoneticPr" => 15,
        "conditionalFormatting" => 16,
        "dataValidations" => 17,
        "hyperlinks" => 18,
        "printOptions" => 19,
        "pageMargins" => 20,
        "pageSetup" => 21,
        "headerFooter" => 22,
        "rowBreaks" => 23,
        "colBreaks" => 24,
        "customProperties" => 25,
        "cellWatches" => 26,
        "ignoredErrors" => 27,
        "smartTags" => 28,
        "drawing" => 29,
        "legacyDrawing" => 30,
        "legacyDrawingHF" => 31,
        "drawingHF" => 32,
        "picture" => 33,
        "oleObjects" => 34,
        "controls" => 35,
        "webPublishItems" => 36,
        "tableParts" => 37,
        "extLst" => 39,
        // mc:AlternateContent and anything unknown sits just before extLst.
        _ => 38,
    }
}

fn parse_columns(node: Node) -> Result<Vec<ColumnDef>, XlsxError> {
    let mut columns = Vec::new();
    for col in xml::children(node, "col") {
        let mut def = ColumnDef::new(0, 0);
        for (name, value) in xml::attributes(col) {
            match name.as_str() {
                "min" => def.min = parse_num(&value, "column min")?,
                "max" => def.max = parse_num(&value, "column max")?,
                "width" => def.width = Some(parse_num(&value, "column width")?),
                "style" => def.style = Some(parse_num(&value, "column style")?),
                "hidden" => def.hidden = parse_bool(&value),
                "customWidth" => def.custom_width = parse_bool(&value),
                _ => def.extra.push((name, value)),
            }
        }
        if def.max < def.min {
            def.max = def.min;
        }
        columns.push(def);
    }
    Ok(columns)
}

fn parse_rows(text: &str, sheet_data: Node) -> Result<BTreeMap<u32, Row>, XlsxError> {
    let mut rows = BTreeMap::new();
    let mut last_row = 0;
    for row_node in xml::children(sheet_data, "row") {
        let index = match row_node.attribute("r") {
            Some(r) => parse_num(r, "row index")?,
            None => last_row + 1,
        };
        last_row = index;

        let mut row = Row::default();
        for (name, value) in xml::attributes(row_node) {
            match name.as_str() {
                // `spans` is an optional load hint and goes stale once cells change.
                "r" | "spans" => {}
                "ht" => row.height = Some(parse_num(&value, "row height")?),
                "customHeight" => row.custom_height = parse_bool(&value),
                "hidden" => row.hidden = parse_bool(&value),
                "s" => row.style = Some(parse_num(&value, "row style")?),
                "customFormat" => row.custom_format = parse_bool(&value),
                _ => row.extra.push((name, value)),
            }
        }

        let mut last_col = 0;
        for cell_node in xml::children(row_node, "c") {
            let col = match cell_node.attribute("r") {
                Some(r) => CellRef::parse(r)?.col,
                None => last_col + 1,
            };
            last_col = col;
            row.cells.insert(col, parse_cell(text, cell_node)?);
        }
        rows.insert(index, row);
    }
    Ok(rows)
}

fn parse_cell(text: &str, node: Node) -> Result<Cell, XlsxError> {
    let mut cell = Cell::default();
    let mut cell_type: Option<String> = None;
    for (name, value) in xml::attributes(node) {
        match name.as_str() {
            "r" => {}
            "s" => cell.style = parse_num(&value, "cell style")?,
            "t" => cell_type = Some(value),
            _ => cell.extra.push((name, value)),
        }
    }

    cell.formula = xml::child(node, "f").map(|f| xml::raw(text, f).to_string());
    let v = xml::child(node, "v").map(|v| v.text().unwrap_or_default().to_string());

    cell.value = match (cell_type.as_deref(), v) {
        (Some("inlineStr"), _) => match xml::child(node, "is") {
            Some(is) => {
                cell.inline_xml = Some(xml::raw(text, is).to_string());
                CellValue::Text(xml::text_runs(is))
            }
            None => CellValue::Blank,
        },
        (Some("s"), Some(v)) => CellValue::SharedString(parse_num(&v, "shared string index")?),
        (Some("b"), Some(v)) => CellValue::Bool(parse_bool(&v)),
        (Some("e"), Some(v)) => CellValue::Error(v),
        (Some("str"), Some(v)) => CellValue::FormulaText(v),
        (Some("d"), Some(v)) => CellValue::Date(v),
        (_, Some(v)) if v.trim().is_empty() => CellValue::Blank,
        (_, Some(v)) => CellValue::Number(parse_num(&v, "cell value")?),
        (_, None) => CellValue::Blank,
    };
    Ok(cell)
}

fn parse_conditional_format(text: &str, node: Node) -> Result<ConditionalFormat, XlsxError> {
    let mut sqref = String::new();
    let mut attrs = Vec::new();
    for (name, value) in xml::attributes(node) {
        if name == "sqref" {
            sqref = value;
        } else {
            attrs.push((name, value));
        }
    }

    let mut rules = Vec::new();
    let mut ext = Vec::new();
    for child in node.children().filter(|n| n.is_element()) {
        if child.tag_name().name() != "cfRule" {
            ext.push(xml::raw(text, child).to_string());
            continue;
        }
        rules.push(ConditionalRule {
            kind: child.attribute("type").unwrap_or_default().to_string(),
            priority: child
                .attribute("priority")
                .map(|p| parse_num(p, "rule priority"))
                .transpose()?,
            dxf_id: child
                .attribute("dxfId")
                .map(|d| parse_num(d, "dxfId"))
                .transpose()?,
            xml: xml::raw(text, child).to_string(),
        });
    }

    Ok(ConditionalFormat {
        sqref,
        rules,
        attrs,
        ext,
    })
}

fn parse_validation(node: Node) -> DataValidation {
    let mut validation = DataValidation {
        sqref: String::new(),
        kind: None,
        formula1: None,
        formula2: None,
        attrs: Vec::new(),
    };
    for (name, value) in xml::attributes(node) {
        match name.as_str() {
            "sqref" => validation.sqref = value,
            "type" => validation.kind = Some(value),
            _ => validation.attrs.push((name, value)),
        }
    }
    validation.formula1 = xml::child(node, "formula1").map(|f| f.text().unwrap_or_default().to_string());
    validation.formula2 = xml::child(node, "formula2").map(|f| f.text().unwrap_or_default().to_string());
    validation
}

fn parse_margins(node: Node) -> Result<PageMargins, XlsxError> {
    let mut margins = PageMargins::default();
    for (name, value) in xml::attributes(node) {
        let slot = match name.as_str() {
            "left" => &mut margins.left,
            "right" => &mut margins.right,
            "top" => &mut margins.top,
            "bottom" => &mut margins.bottom,
            "header" => &mut margins.header,
            "footer" => &mut margins.footer,
            _ => continue,
        };
        *slot = parse_num(&value, "page margin")?;
    }
    Ok(margins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006" xmlns:x14ac="http://schemas.microsoft.com/office/spreadsheetml/2009/9/ac" mc:Ignorable="x14ac">
  <dimension ref="A1:C3"/>
  <sheetViews><sheetView tabSelected="1" workbookViewId="0"/></sheetViews>
  <sheetFormatPr defaultRowHeight="15" x14ac:dyDescent="0.25"/>
  <cols><col min="1" max="1" width="30.5" customWidth="1"/><col min="2" max="3" width="12" hidden="1" style="4"/></cols>
  <sheetData>
    <row r="1" spans="1:3" ht="24" customHeight="1" x14ac:dyDescent="0.25">
      <c r="A1" s="1" t="s"><v>0</v></c>
      <c r="B1" s="1"/>
    </row>
    <row r="2">
      <c r="A2" t="inlineStr"><is><t>Fish &amp; chips</t></is></c>
      <c r="B2"><v>4.5</v></c>
      <c r="C2" t="str"><f>A2&amp;"!"</f><v>Fish &amp; chips!</v></c>
    </row>
    <row r="3" hidden="1"><c r="A3" t="b"><v>1</v></c></row>
  </sheetData>
  <mergeCells count="1"><mergeCell ref="A1:B1"/></mergeCells>
  <conditionalFormatting sqref="B2:B10"><cfRule type="cellIs" dxfId="0" priority="1" operator="greaterThan"><formula>3</formula></cfRule></conditionalFormatting>
  <dataValidations count="1"><dataValidation type="list" allowBlank="1" showInputMessage="1" sqref="C2:C10"><formula1>"Yes,No,Maybe"</formula1></dataValidation></dataValidations>
  <pageMargins left="0.5" right="0.5" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>
  <pageSetup orientation="landscape" r:id="rId1"/>
  <drawing r:id="rId2"/>
</worksheet>"#;

    #[test]
    fn test_parse_models_structure() {
        let sheet = Sheet::parse(SHEET, "xl/worksheets/sheet1.xml").unwrap();

        assert_eq!(sheet.columns.len(), 2);
        assert_eq!(sheet.hidden_columns(), BTreeSet::from([2, 3]));
        assert_eq!(sheet.column(3).and_then(|c| c.style), Some(4));

        let row1 = &sheet.rows[&1];
        assert_eq!(row1.height, Some(24.0));
        assert!(row1.custom_height);
        assert_eq!(
            row1.extra_attributes(),
            &[("x14ac:dyDescent".to_string(), "0.25".to_string())]
        );
        assert_eq!(row1.cells.len(), 2);
        assert_eq!(sheet.cell(CellRef::new(1, 2)).map(|c| c.style), Some(1));
        assert!(sheet.value_at(CellRef::new(1, 2)).unwrap().is_blank());

        assert_eq!(
            sheet.value_at(CellRef::new(2, 1)),
            Some(&CellValue::Text("Fish & chips".to_string()))
        );
        assert_eq!(sheet.value_at(CellRef::new(2, 2)), Some(&CellValue::Number(4.5)));
        assert!(sheet.cell(CellRef::new(2, 3)).unwrap().formula_xml().is_some());
        assert!(sheet.rows[&3].hidden);

        assert_eq!(sheet.merged, vec![CellRange::parse("A1:B1").unwrap()]);
        assert_eq!(sheet.conditional_formats.len(), 1);
        assert_eq!(sheet.conditional_formats[0].rules[0].dxf_id, Some(0));
        assert_eq!(sheet.validations[0].allowed_values(), vec!["Yes", "No", "Maybe"]);
        assert!(sheet.validation_at(CellRef::new(5, 3)).is_some());
        assert!(sheet.validation_at(CellRef::new(5, 4)).is_none());
        assert_eq!(sheet.page_margins.unwrap().left, 0.5);
        assert_eq!(
            sheet.page_setup.as_ref().unwrap().orientation(),
            Some(Orientation::Landscape)
        );

        let preserved: Vec<&str> = sheet.preserved_elements().collect();
        assert_eq!(preserved, vec!["dimension", "sheetViews", "sheetFormatPr", "drawing"]);
        assert!(sheet.extras().iter().any(|e| e.name == "drawing" && e.has_relationship));
    }

    #[test]
    fn test_hyperlinks_keep_a_portable_subset() {
        let text = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheetData/>
<hyperlinks><hyperlink ref="A1" r:id="rId1"/><hyperlink ref="A2" location="Notes!A1" display="Notes"/></hyperlinks>
</worksheet>"#;
        let sheet = Sheet::parse(text, "xl/worksheets/sheet1.xml").unwrap();
        let links = &sheet.extras()[0];
        assert!(links.has_relationship);
        assert_eq!(
            links.portable.as_deref(),
            Some(r#"<hyperlinks><hyperlink ref="A2" location="Notes!A1" display="Notes"/></hyperlinks>"#)
        );

        let external_only = text.replace(r#"<hyperlink ref="A2" location="Notes!A1" display="Notes"/>"#, "");
        let sheet = Sheet::parse(&external_only, "xl/worksheets/sheet1.xml").unwrap();
        assert_eq!(sheet.extras()[0].portable, None);
    }

    #[test]
    fn test_serialize_then_parse_is_structurally_equal() {
        let sheet = Sheet::parse(SHEET, "xl/worksheets/sheet1.xml").unwrap();
        let reparsed = Sheet::parse(&sheet.to_xml(), "xl/worksheets/sheet1.xml").unwrap();
        assert_eq!(sheet, reparsed);
    }

    #[test]
    fn test_serialize_orders_children_by_schema() {
        let sheet = Sheet::parse(SHEET, "xl/worksheets/sheet1.xml").unwrap();
        let out = sheet.to_xml();
        let order = [
            "<dimension",
            "<sheetViews",
            "<sheetFormatPr",
            "<cols>",
            "<sheetData>",
            "<mergeCells",
            "<conditionalFormatting",
            "<dataValidations",
            "<pageMargins",
            "<pageSetup",
            "<drawing",
        ];
        let positions: Vec<usize> = order.iter().map(|t| out.find(t).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{out}");
    }

    #[test]
    fn test_cell_mut_inherits_column_style() {
        let mut sheet = Sheet::parse(SHEET, "xl/worksheets/sheet1.xml").unwrap();
        let cell = sheet.cell_mut(CellRef::new(9, 3));
        assert_eq!(cell.style, 4);
        cell.set_value(CellValue::text("new"));
        assert_eq!(
            sheet.value_at(CellRef::new(9, 3)),
            Some(&CellValue::Text("new".to_string()))
        );
    }

    #[test]
    fn test_set_value_replaces_formula() {
        let mut sheet = Sheet::parse(SHEET, "xl/worksheets/sheet1.xml").unwrap();
        let cell = sheet.cell_mut(CellRef::new(2, 3));
        cell.set_value(CellValue::Number(2.0));
        assert!(cell.formula_xml().is_none());
        assert!(sheet.to_xml().contains(r#"<c r="C2"><v>2</v></c>"#));
    }

    #[test]
    fn test_refresh_dimension_tracks_written_cells() {
        let mut sheet = Sheet::parse(SHEET, "xl/worksheets/sheet1.xml").unwrap();
        sheet
            .cell_mut(CellRef::new(30, 5))
            .set_value(CellValue::text("x"));
        sheet.refresh_dimension();
        assert!(sheet.to_xml().contains(r#"<dimension ref="A1:E30"/>"#));
    }

    #[test]
    fn test_prefixed_worksheet_keeps_prefix() {
        let text = r#"<x:worksheet xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><x:sheetData><x:row r="1"><x:c r="A1"><x:v>1</x:v></x:c></x:row></x:sheetData></x:worksheet>"#;
        let sheet = Sheet::parse(text, "sheet.xml").unwrap();
        let out = sheet.to_xml();
        assert!(out.contains(r#"<x:row r="1"><x:c r="A1"><x:v>1</x:v></x:c></x:row>"#));
        assert!(out.ends_with("</x:worksheet>"));
        assert_eq!(Sheet::parse(&out, "sheet.xml").unwrap(), sheet);
    }
}
