//! Workbook stylesheet (`xl/styles.xml`)
//!
//! Fonts, fills and borders are read so callers can inspect how a cell is
//! formatted. The only change the merge engine makes is adding cell formats
//! (`<xf>`) that copy an existing one with a different alignment; those are
//! appended to `cellXfs` and the rest of the part is left untouched.

use std::collections::HashMap;
use std::fmt::Write as _;

use roxmltree::Node;

use super::xml::{self, get_attr, parse_bool, parse_num, tag};
use super::XlsxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HorizontalAlignment {
    General,
    Left,
    Center,
    Right,
    Fill,
    Justify,
    CenterContinuous,
    Distributed,
}

impl HorizontalAlignment {
    pub fn as_str(self) -> &'static str {
        match self {
            HorizontalAlignment::General => "general",
            HorizontalAlignment::Left => "left",
            HorizontalAlignment::Center => "center",
            HorizontalAlignment::Right => "right",
            HorizontalAlignment::Fill => "fill",
            HorizontalAlignment::Justify => "justify",
            HorizontalAlignment::CenterContinuous => "centerContinuous",
            HorizontalAlignment::Distributed => "distributed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "general" => HorizontalAlignment::General,
            "left" => HorizontalAlignment::Left,
            "center" => HorizontalAlignment::Center,
            "right" => HorizontalAlignment::Right,
            "fill" => HorizontalAlignment::Fill,
            "justify" => HorizontalAlignment::Justify,
            "centerContinuous" => HorizontalAlignment::CenterContinuous,
            "distributed" => HorizontalAlignment::Distributed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Color {
    pub rgb: Option<String>,
    pub theme: Option<u32>,
    pub indexed: Option<u32>,
    pub tint: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Font {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub strike: bool,
    pub size: Option<f64>,
    pub name: Option<String>,
    pub color: Option<Color>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fill {
    pub pattern: Option<String>,
    pub fg_color: Option<Color>,
    pub bg_color: Option<Color>,
}

/// Edge styles of a border (`thin`, `medium`, ...); `None` means no line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Border {
    pub left: Option<String>,
    pub right: Option<String>,
    pub top: Option<String>,
    pub bottom: Option<String>,
}

impl Border {
    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none() && self.top.is_none() && self.bottom.is_none()
    }
}

/// One entry of `cellXfs`
#[derive(Debug, Clone, PartialEq)]
pub struct CellFormat {
    attrs: Vec<(String, String)>,
    alignment: Option<Vec<(String, String)>>,
    other_children: Vec<String>,
}

impl CellFormat {
    fn index_attr(&self, name: &str) -> u32 {
        get_attr(&self.attrs, name)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    pub fn font_id(&self) -> u32 {
        self.index_attr("fontId")
    }

    pub fn fill_id(&self) -> u32 {
        self.index_attr("fillId")
    }

    pub fn border_id(&self) -> u32 {
        self.index_attr("borderId")
    }

    pub fn num_fmt_id(&self) -> u32 {
        self.index_attr("numFmtId")
    }

    pub fn horizontal(&self) -> Option<HorizontalAlignment> {
        let attrs = self.alignment.as_ref()?;
        get_attr(attrs, "horizontal").and_then(HorizontalAlignment::parse)
    }

    pub fn wrap_text(&self) -> bool {
        self.alignment
            .as_ref()
            .and_then(|attrs| get_attr(attrs, "wrapText"))
            .is_some_and(parse_bool)
    }

    /// Same font, fill, border and number format with a new alignment.
    /// Other alignment settings (vertical, indent, rotation) carry over.
    fn realigned(&self, horizontal: HorizontalAlignment, wrap: bool) -> Self {
        let mut attrs = self.attrs.clone();
        xml::set_attr(&mut attrs, "applyAlignment", "1");
        let mut alignment = self.alignment.clone().unwrap_or_default();
        xml::set_attr(&mut alignment, "horizontal", horizontal.as_str());
        if wrap {
            xml::set_attr(&mut alignment, "wrapText", "1");
        } else {
            alignment.retain(|(name, _)| name != "wrapText");
        }
        Self {
            attrs,
            alignment: Some(alignment),
            other_children: self.other_children.clone(),
        }
    }

    fn plain() -> Self {
        Self {
            attrs: ["numFmtId", "fontId", "fillId", "borderId", "xfId"]
                .iter()
                .map(|name| (name.to_string(), "0".to_string()))
                .collect(),
            alignment: None,
            other_children: Vec::new(),
        }
    }

    fn to_xml(&self, prefix: Option<&str>) -> String {
        let mut out = format!("<{}", tag(prefix, "xf"));
        xml::write_attrs(&mut out, &self.attrs);
        if self.alignment.is_none() && self.other_children.is_empty() {
            out.push_str("/>");
            return out;
        }
        out.push('>');
        if let Some(alignment) = &self.alignment {
            let _ = write!(out, "<{}", tag(prefix, "alignment"));
            xml::write_attrs(&mut out, alignment);
            out.push_str("/>");
        }
        for child in &self.other_children {
            out.push_str(child);
        }
        let _ = write!(out, "</{}>", tag(prefix, "xf"));
        out
    }
}

/// Resolved view of one cell format
#[derive(Debug, Clone, Copy)]
pub struct CellStyle<'a> {
    pub format: &'a CellFormat,
    pub font: Option<&'a Font>,
    pub fill: Option<&'a Fill>,
    pub border: Option<&'a Border>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Styles {
    prefix: Option<String>,
    fonts: Vec<Font>,
    fills: Vec<Fill>,
    borders: Vec<Border>,
    cell_formats: Vec<CellFormat>,
    dxf_count: usize,
    /// Number of `cellXfs` entries present in the source part
    original_formats: usize,
    derived: HashMap<(u32, HorizontalAlignment, bool), u32>,
}

impl Styles {
    pub fn parse(text: &str, part: &str) -> Result<Self, XlsxError> {
        let doc = xml::parse_document(text, part)?;
        let root = doc.root_element();
        let mut styles = Styles {
            prefix: xml::prefix_of(text, root),
            ..Styles::default()
        };

        if let Some(fonts) = xml::child(root, "fonts") {
            styles.fonts = xml::children(fonts, "font")
                .map(parse_font)
                .collect::<Result<_, _>>()?;
        }
        if let Some(fills) = xml::child(root, "fills") {
            styles.fills = xml::children(fills, "fill").map(parse_fill).collect::<Result<_, _>>()?;
        }
        if let Some(borders) = xml::child(root, "borders") {
            styles.borders = xml::children(borders, "border").map(parse_border).collect();
        }
        if let Some(xfs) = xml::child(root, "cellXfs") {
            styles.cell_formats = xml::children(xfs, "xf")
                .map(|xf| parse_cell_format(text, xf))
                .collect();
        }
        if let Some(dxfs) = xml::child(root, "dxfs") {
            styles.dxf_count = xml::children(dxfs, "dxf").count();
        }
        styles.original_formats = styles.cell_formats.len();
        Ok(styles)
    }

    pub fn cell_format(&self, index: u32) -> Option<&CellFormat> {
        self.cell_formats.get(index as usize)
    }

    pub fn cell_format_count(&self) -> usize {
        self.cell_formats.len()
    }

    pub fn dxf_count(&self) -> usize {
        self.dxf_count
    }

    pub fn cell_style(&self, index: u32) -> Option<CellStyle<'_>> {
        let format = self.cell_format(index)?;
        Some(CellStyle {
            format,
            font: self.fonts.get(format.font_id() as usize),
            fill: self.fills.get(format.fill_id() as usize),
            border: self.borders.get(format.border_id() as usize),
        })
    }

    /// Index of a cell format equal to `base` but aligned as requested,
    /// adding one if no existing format matches.
    pub fn aligned(&mut self, base: u32, horizontal: HorizontalAlignment, wrap: bool) -> u32 {
        let key = (base, horizontal, wrap);
        if let Some(&index) = self.derived.get(&key) {
            return index;
        }
        let template = match self.cell_formats.get(base as usize) {
            Some(format) => format.clone(),
            None => CellFormat::plain(),
        };
        let index = if template.horizontal() == Some(horizontal) && template.wrap_text() == wrap {
            base
        } else {
            let wanted = template.realigned(horizontal, wrap);
            match self.cell_formats.iter().position(|f| *f == wanted) {
                Some(existing) => existing as u32,
                None => {
                    self.cell_formats.push(wanted);
                    (self.cell_formats.len() - 1) as u32
                }
            }
        };
        self.derived.insert(key, index);
        index
    }

    /// True when formats were added since parsing.
    pub fn is_dirty(&self) -> bool {
        self.cell_formats.len() != self.original_formats
    }

    /// The source part with any added cell formats spliced into `cellXfs`.
    pub fn apply_to(&self, text: &str, part: &str) -> Result<String, XlsxError> {
        if !self.is_dirty() {
            return Ok(text.to_string());
        }
        let fragment: String = self.cell_formats[self.original_formats..]
            .iter()
            .map(|format| format.to_xml(self.prefix.as_deref()))
            .collect();

        let appended = {
            let doc = xml::parse_document(text, part)?;
            let root = doc.root_element();
            match xml::child(root, "cellXfs") {
                Some(xfs) => xml::append_child(text, xfs, &fragment),
                None => {
                    return Err(XlsxError::Invalid(format!("{part} has no cellXfs table")));
                }
            }
        };

        let doc = xml::parse_document(&appended, part)?;
        let xfs = xml::child(doc.root_element(), "cellXfs")
            .ok_or_else(|| XlsxError::Invalid(format!("{part} has no cellXfs table")))?;
        Ok(xml::replace_attr(
            &appended,
            xfs,
            "count",
            &self.cell_formats.len().to_string(),
        ))
    }
}

fn parse_color(node: Node) -> Result<Color, XlsxError> {
    Ok(Color {
        rgb: node.attribute("rgb").map(str::to_string),
        theme: node.attribute("theme").map(|v| parse_num(v, "theme color")).transpose()?,
        indexed: node.attribute("indexed").map(|v| parse_num(v, "indexed color")).transpose()?,
        tint: node.attribute("tint").map(|v| parse_num(v, "color tint")).transpose()?,
    })
}

/// `<b/>` is on; `<b val="0"/>` is off.
fn flag(node: Node, local: &str) -> bool {
    xml::child(node, local).is_some_and(|n| n.attribute("val").is_none_or(parse_bool))
}

fn parse_font(node: Node) -> Result<Font, XlsxError> {
    Ok(Font {
        bold: flag(node, "b"),
        italic: flag(node, "i"),
        underline: xml::child(node, "u").is_some_and(|u| u.attribute("val") != Some("none")),
        strike: flag(node, "strike"),
        size: xml::child(node, "sz")
            .and_then(|n| n.attribute("val"))
            .map(|v| parse_num(v, "font size"))
            .transpose()?,
        name: xml::child(node, "name")
            .and_then(|n| n.attribute("val"))
            .map(str::to_string),
        color: xml::child(node, "color").map(parse_color).transpose()?,
    })
}

fn parse_fill(node: Node) -> Result<Fill, XlsxError> {
    let Some(pattern) = xml::child(node, "patternFill") else {
        // Gradient fills are kept in the part but not modelled.
        return Ok(Fill::default());
    };
    Ok(Fill {
        pattern: pattern.attribute("patternType").map(str::to_string),
        fg_color: xml::child(pattern, "fgColor").map(parse_color).transpose()?,
        bg_color: xml::child(pattern, "bgColor").map(parse_color).transpose()?,
    })
}

fn parse_border(node: Node) -> Border {
    let edge = |local: &str| {
        xml::child(node, local)
            .and_then(|n| n.attribute("style"))
            .filter(|style| *style != "none")
            .map(str::to_string)
    };
    Border {
        left: edge("left"),
        right: edge("right"),
        top: edge("top"),
        bottom: edge("bottom"),
    }
}

fn parse_cell_format(text: &str, node: Node) -> CellFormat {
    let mut alignment = None;
    let mut other_children = Vec::new();
    for child in node.children().filter(|n| n.is_element()) {
        if child.tag_name().name() == "alignment" {
            alignment = Some(xml::attributes(child));
        } else {
            other_children.push(xml::raw(text, child).to_string());
        }
    }
    CellFormat {
        attrs: xml::attributes(node),
        alignment,
        other_children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <fonts count="2">
    <font><sz val="11"/><name val="Calibri"/></font>
    <font><b/><sz val="12"/><color rgb="FFFF0000"/><name val="Arial"/></font>
  </fonts>
  <fills count="3">
    <fill><patternFill patternType="none"/></fill>
    <fill><patternFill patternType="gray125"/></fill>
    <fill><patternFill patternType="solid"><fgColor rgb="FFFFFF00"/><bgColor indexed="64"/></patternFill></fill>
  </fills>
  <borders count="2">
    <border><left/><right/><top/><bottom/></border>
    <border><left style="thin"/><right style="thin"/><top style="thin"/><bottom style="thin"/></border>
  </borders>
  <cellXfs count="2">
    <xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>
    <xf numFmtId="0" fontId="1" fillId="2" borderId="1" xfId="0" applyFont="1"><alignment vertical="top"/><protection locked="0"/></xf>
  </cellXfs>
  <dxfs count="1"><dxf><font><color rgb="FF9C0006"/></font></dxf></dxfs>
</styleSheet>"#;

    #[test]
    fn test_cell_style_resolves_components() {
        let styles = Styles::parse(STYLES, "xl/styles.xml").unwrap();
        let style = styles.cell_style(1).unwrap();
        let font = style.font.unwrap();
        assert!(font.bold);
        assert_eq!(font.size, Some(12.0));
        assert_eq!(font.color.as_ref().and_then(|c| c.rgb.as_deref()), Some("FFFF0000"));
        assert_eq!(style.fill.unwrap().pattern.as_deref(), Some("solid"));
        assert_eq!(style.border.unwrap().left.as_deref(), Some("thin"));
        assert!(styles.cell_style(0).unwrap().border.unwrap().is_empty());
        assert_eq!(styles.dxf_count(), 1);
    }

    #[test]
    fn test_aligned_keeps_font_fill_and_border() {
        let mut styles = Styles::parse(STYLES, "xl/styles.xml").unwrap();
        let idx = styles.aligned(1, HorizontalAlignment::Center, true);
        assert_eq!(idx, 2);
        let format = styles.cell_format(idx).unwrap();
        assert_eq!(format.font_id(), 1);
        assert_eq!(format.fill_id(), 2);
        assert_eq!(format.border_id(), 1);
        assert_eq!(format.horizontal(), Some(HorizontalAlignment::Center));
        assert!(format.wrap_text());
        assert!(styles.is_dirty());

        // Cached, and equal requests never add a second entry.
        assert_eq!(styles.aligned(1, HorizontalAlignment::Center, true), 2);
        assert_eq!(styles.cell_format_count(), 3);
    }

    #[test]
    fn test_apply_to_appends_formats_and_updates_count() {
        let mut styles = Styles::parse(STYLES, "xl/styles.xml").unwrap();
        assert_eq!(styles.apply_to(STYLES, "xl/styles.xml").unwrap(), STYLES);

        styles.aligned(0, HorizontalAlignment::Left, true);
        let out = styles.apply_to(STYLES, "xl/styles.xml").unwrap();
        assert!(out.contains(r#"<cellXfs count="3">"#));
        assert!(out.contains(r#"<alignment horizontal="left" wrapText="1"/></xf></cellXfs>"#));

        let reparsed = Styles::parse(&out, "xl/styles.xml").unwrap();
        assert_eq!(reparsed.cell_format_count(), 3);
        assert_eq!(
            reparsed.cell_format(1).unwrap(),
            styles.cell_format(1).unwrap()
        );
    }

    #[test]
    fn test_realign_keeps_other_alignment_settings() {
        let mut styles = Styles::parse(STYLES, "xl/styles.xml").unwrap();
        let idx = styles.aligned(1, HorizontalAlignment::Left, false);
        let xml = styles.cell_format(idx).unwrap().to_xml(None);
        assert!(xml.contains(r#"<alignment vertical="top" horizontal="left"/>"#), "{xml}");
        assert!(xml.contains(r#"<protection locked="0"/>"#));
    }
}
