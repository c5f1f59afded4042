//! OPC package: the zip container holding every part of a workbook

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use roxmltree::Node;

use super::xml;
use super::XlsxError;

/// Largest uncompressed part we are willing to inflate into memory.
pub(crate) const MAX_PART_BYTES: u64 = 256 * 1024 * 1024;
/// Upper bound on the buffer reserved up front from a part's declared size.
const PREALLOC_LIMIT: u64 = 1024 * 1024;

pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub(crate) const ROOT_RELS_PART: &str = "_rels/.rels";

const OFFICE_DOCUMENT_REL_SUFFIX: &str = "/officeDocument";

/// All parts of a package keyed by part name (no leading `/`).
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Package {
    parts: BTreeMap<String, Vec<u8>>,
}

impl Package {
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        Self::from_bytes_with_limit(bytes, MAX_PART_BYTES)
    }

    /// Reads every part, failing on any part larger than `max_part` bytes.
    pub(crate) fn from_bytes_with_limit(bytes: &[u8], max_part: u64) -> Result<Self, XlsxError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = BTreeMap::new();

        for i in 0..archive.len() {
            let file = archive.by_index(i)?;
            if !file.is_file() {
                continue;
            }
            let name = file.name().trim_start_matches('/').to_string();
            let size = file.size();
            if size > max_part {
                return Err(XlsxError::PartTooLarge {
                    part: name,
                    size,
                    max: max_part,
                });
            }

            // The declared size can lie; cap what we actually inflate as well.
            let mut buf = Vec::with_capacity(size.min(PREALLOC_LIMIT) as usize);
            file.take(max_part + 1).read_to_end(&mut buf)?;
            if buf.len() as u64 > max_part {
                return Err(XlsxError::PartTooLarge {
                    part: name,
                    size: buf.len() as u64,
                    max: max_part,
                });
            }
            parts.insert(name, buf);
        }

        if !parts.contains_key(CONTENT_TYPES_PART) {
            return Err(XlsxError::MissingPart(CONTENT_TYPES_PART.to_string()));
        }
        Ok(Self { parts })
    }

    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for (name, bytes) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(bytes)?;
        }

        Ok(zip.finish()?.into_inner())
    }

    pub(crate) fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .get(name.trim_start_matches('/'))
            .map(Vec::as_slice)
    }

    pub(crate) fn require(&self, name: &str) -> Result<&[u8], XlsxError> {
        self.part(name)
            .ok_or_else(|| XlsxError::MissingPart(name.to_string()))
    }

    pub(crate) fn require_text(&self, name: &str) -> Result<&str, XlsxError> {
        xml::part_text(self.require(name)?, name)
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.parts.contains_key(name.trim_start_matches('/'))
    }

    pub(crate) fn set_part(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        self.parts
            .insert(name.trim_start_matches('/').to_string(), bytes);
    }

    /// Main workbook part, as declared by the package root relationships.
    pub(crate) fn workbook_part(&self) -> Result<String, XlsxError> {
        if let Some(bytes) = self.part(ROOT_RELS_PART) {
            let text = xml::part_text(bytes, ROOT_RELS_PART)?;
            let rels = parse_relationships(text, ROOT_RELS_PART)?;
            if let Some(rel) = rels
                .iter()
                .find(|r| r.rel_type.ends_with(OFFICE_DOCUMENT_REL_SUFFIX))
            {
                return Ok(resolve_target("", &rel.target));
            }
        }
        Ok("xl/workbook.xml".to_string())
    }

    /// Register a content type override for a newly added part.
    pub(crate) fn add_override(&mut self, part: &str, content_type: &str) -> Result<(), XlsxError> {
        let updated = {
            let text = self.require_text(CONTENT_TYPES_PART)?;
            let doc = xml::parse_document(text, CONTENT_TYPES_PART)?;
            let root = doc.root_element();
            let prefix = xml::prefix_of(text, root);
            let fragment = format!(
                r#"<{} PartName="/{}" ContentType="{}"/>"#,
                xml::tag(prefix.as_deref(), "Override"),
                xml::escape(part),
                xml::escape(content_type)
            );
            xml::append_child(text, root, &fragment)
        };
        self.set_part(CONTENT_TYPES_PART, updated.into_bytes());
        Ok(())
    }

    pub(crate) fn next_worksheet_part(&self, workbook_part: &str) -> String {
        let dir = match workbook_part.rsplit_once('/') {
            Some((dir, _)) => format!("{dir}/worksheets"),
            None => "worksheets".to_string(),
        };
        (1..)
            .map(|n| format!("{dir}/sheet{n}.xml"))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or_else(|| format!("{dir}/sheet.xml"))
    }
}

/// One `<Relationship>` of a `.rels` part
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

pub(crate) fn parse_relationships(text: &str, part: &str) -> Result<Vec<Relationship>, XlsxError> {
    let doc = xml::parse_document(text, part)?;
    let rels = doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "Relationship")
        .filter_map(relationship)
        .collect();
    Ok(rels)
}

fn relationship(node: Node) -> Option<Relationship> {
    Some(Relationship {
        id: node.attribute("Id")?.to_string(),
        rel_type: node.attribute("Type").unwrap_or_default().to_string(),
        target: node.attribute("Target").unwrap_or_default().to_string(),
        external: node
            .attribute("TargetMode")
            .is_some_and(|mode| mode.eq_ignore_ascii_case("External")),
    })
}

/// `xl/workbook.xml -> xl/_rels/workbook.xml.rels`
pub(crate) fn rels_part_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolve a relationship target relative to the part that owns the relationship.
pub(crate) fn resolve_target(source_part: &str, target: &str) -> String {
    let target = target.split('#').next().unwrap_or(target);
    if let Some(absolute) = target.strip_prefix('/') {
        return normalize(absolute);
    }
    let base = source_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    normalize(&format!("{base}/{target}"))
}

/// Inverse of [`resolve_target`] for parts below the source part's directory.
pub(crate) fn relative_target(source_part: &str, part: &str) -> String {
    match source_part.rsplit_once('/') {
        Some((dir, _)) => match part.strip_prefix(&format!("{dir}/")) {
            Some(relative) => relative.to_string(),
            None => format!("/{part}"),
        },
        None => part.to_string(),
    }
}

fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rels_part_for() {
        assert_eq!(rels_part_for("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(rels_part_for("workbook.xml"), "_rels/workbook.xml.rels");
    }

    #[test]
    fn test_resolve_target_variants() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/worksheets/sheet2.xml"),
            "xl/worksheets/sheet2.xml"
        );
        assert_eq!(
            resolve_target("xl/worksheets/sheet1.xml", "../media/image1.png"),
            "xl/media/image1.png"
        );
        assert_eq!(resolve_target("", "xl/workbook.xml"), "xl/workbook.xml");
    }

    #[test]
    fn test_relative_target() {
        assert_eq!(
            relative_target("xl/workbook.xml", "xl/worksheets/sheet3.xml"),
            "worksheets/sheet3.xml"
        );
        assert_eq!(relative_target("xl/workbook.xml", "other/sheet.xml"), "/other/sheet.xml");
    }

    #[test]
    fn test_parse_relationships() {
        let text = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
            <Relationship Id="rId9" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
        </Relationships>"#;
        let rels = parse_relationships(text, "xl/_rels/workbook.xml.rels").unwrap();
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].id, "rId1");
        assert!(!rels[0].external);
        assert!(rels[1].external);
    }

    fn zip_of(parts: &[(&str, &[u8])], method: zip::CompressionMethod) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default().compression_method(method);
        for (name, bytes) in parts {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    /// Overwrite the uncompressed size recorded for every entry, in both the
    /// local headers and the central directory.
    fn understate_sizes(archive: &mut [u8], size: u32) {
        const LOCAL: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];
        const CENTRAL: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];
        let mut i = 0;
        while i + 4 <= archive.len() {
            let offset = match &archive[i..i + 4] {
                sig if sig == LOCAL => Some(22),
                sig if sig == CENTRAL => Some(24),
                _ => None,
            };
            if let Some(offset) = offset {
                archive[i + offset..i + offset + 4].copy_from_slice(&size.to_le_bytes());
            }
            i += 1;
        }
    }

    #[test]
    fn test_part_limit_uses_declared_size() {
        let archive = zip_of(
            &[(CONTENT_TYPES_PART, b"<Types/>"), ("xl/big.bin", &[b'x'; 100])],
            zip::CompressionMethod::Stored,
        );

        let err = Package::from_bytes_with_limit(&archive, 50).unwrap_err();
        assert!(matches!(
            err,
            XlsxError::PartTooLarge { ref part, size: 100, max: 50 } if part == "xl/big.bin"
        ));
        assert!(Package::from_bytes_with_limit(&archive, 100).is_ok());
    }

    #[test]
    fn test_part_limit_catches_understated_size() {
        let mut archive = zip_of(&[("xl/big.bin", &[b'x'; 100])], zip::CompressionMethod::Deflated);
        understate_sizes(&mut archive, 10);

        let err = Package::from_bytes_with_limit(&archive, 50).unwrap_err();
        assert!(matches!(
            err,
            XlsxError::PartTooLarge { size: 51, max: 50, .. }
        ));
    }

    #[test]
    fn test_rejects_non_zip_bytes() {
        assert!(matches!(
            Package::from_bytes(b"definitely not a zip"),
            Err(XlsxError::Zip(_))
        ));
    }
}
