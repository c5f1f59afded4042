//! Small XML helpers shared by the package, workbook, worksheet and styles readers.
//!
//! Parsing goes through `roxmltree` so that byte ranges of the source text are
//! available; untouched elements are carried around as the exact text they
//! were read from. Writing is plain string building with `quick-xml` escaping.

use std::borrow::Cow;
use std::fmt::Write as _;

use roxmltree::{Document, Node};

use super::XlsxError;

pub(crate) const OFFICE_REL_NS: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

pub(crate) const XML_DECLARATION: &str =
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Decode a package part as UTF-8, dropping a leading byte order mark.
pub(crate) fn part_text<'a>(bytes: &'a [u8], part: &str) -> Result<&'a str, XlsxError> {
    let text = std::str::from_utf8(bytes).map_err(|_| XlsxError::Utf8(part.to_string()))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

pub(crate) fn parse_document<'a>(xml: &'a str, part: &str) -> Result<Document<'a>, XlsxError> {
    Document::parse(xml).map_err(|source| XlsxError::Xml {
        part: part.to_string(),
        source,
    })
}

pub(crate) fn escape(value: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(value)
}

/// Source text of an element, including its children.
pub(crate) fn raw<'a>(src: &'a str, node: Node) -> &'a str {
    &src[node.range()]
}

/// Byte offset just past the `>` that closes the start tag beginning at `start`.
pub(crate) fn start_tag_end(src: &str, start: usize) -> usize {
    let bytes = src.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return i + 1,
            None => {}
        }
        i += 1;
    }
    bytes.len()
}

/// The qualified name an element was written with (`x:row` or `row`).
pub(crate) fn qualified_name<'a>(src: &'a str, node: Node) -> &'a str {
    let start = node.range().start + 1;
    let rest = &src[start..];
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len());
    &rest[..end]
}

/// Prefix of an element's qualified name, if any.
pub(crate) fn prefix_of(src: &str, node: Node) -> Option<String> {
    qualified_name(src, node)
        .split_once(':')
        .map(|(prefix, _)| prefix.to_string())
}

/// Prefix an element name the same way its container is prefixed.
pub(crate) fn tag(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) => format!("{p}:{local}"),
        None => local.to_string(),
    }
}

/// Attributes of an element in document order, with qualified names.
pub(crate) fn attributes(node: Node) -> Vec<(String, String)> {
    node.attributes()
        .map(|attr| {
            let name = match attr.namespace() {
                None => attr.name().to_string(),
                Some(XML_NS) => format!("xml:{}", attr.name()),
                Some(uri) => match node.lookup_prefix(uri) {
                    Some(prefix) if !prefix.is_empty() => format!("{prefix}:{}", attr.name()),
                    _ => attr.name().to_string(),
                },
            };
            (name, attr.value().to_string())
        })
        .collect()
}

/// True when the element or any descendant carries an attribute from the
/// officeDocument relationships namespace (`r:id`, `r:embed`, ...).
pub(crate) fn references_relationship(node: Node) -> bool {
    node.descendants().any(|n| {
        n.is_element()
            && n
                .attributes()
                .any(|attr| attr.namespace() == Some(OFFICE_REL_NS))
    })
}

/// The element rebuilt from only those children that point at no
/// relationship, or `None` when no child is left.
pub(crate) fn without_relationship_children(src: &str, node: Node) -> Option<String> {
    let kept: Vec<&str> = node
        .children()
        .filter(|c| c.is_element() && !references_relationship(*c))
        .map(|c| raw(src, c))
        .collect();
    if kept.is_empty() {
        return None;
    }
    let start = node.range().start;
    let mut out = src[start..start_tag_end(src, start)].to_string();
    out.extend(kept);
    let _ = write!(out, "</{}>", qualified_name(src, node));
    Some(out)
}

pub(crate) fn child<'a, 'input>(node: Node<'a, 'input>, local: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == local)
}

pub(crate) fn children<'a, 'input>(
    node: Node<'a, 'input>,
    local: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == local)
}

/// Concatenated text of every `<t>` below `node`, skipping phonetic runs.
pub(crate) fn text_runs(node: Node) -> String {
    let mut out = String::new();
    for t in node.descendants().filter(|n| n.is_element() && n.tag_name().name() == "t") {
        let in_phonetic = t
            .ancestors()
            .any(|a| a.is_element() && a.tag_name().name() == "rPh");
        if !in_phonetic {
            out.push_str(t.text().unwrap_or_default());
        }
    }
    out
}

pub(crate) fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

pub(crate) fn parse_num<T: std::str::FromStr>(
    value: &str,
    what: &str,
) -> Result<T, XlsxError> {
    value
        .trim()
        .parse()
        .map_err(|_| XlsxError::Invalid(format!("invalid {what}: {value:?}")))
}

pub(crate) fn write_attrs(out: &mut String, attrs: &[(String, String)]) {
    for (name, value) in attrs {
        let _ = write!(out, r#" {name}="{}""#, escape(value));
    }
}

pub(crate) fn set_attr(attrs: &mut Vec<(String, String)>, name: &str, value: impl Into<String>) {
    let value = value.into();
    match attrs.iter_mut().find(|(n, _)| n == name) {
        Some(slot) => slot.1 = value,
        None => attrs.push((name.to_string(), value)),
    }
}

pub(crate) fn get_attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

/// Insert `fragment` as the last child of `node`, returning the new document text.
pub(crate) fn append_child(src: &str, node: Node, fragment: &str) -> String {
    let range = node.range();
    let element = &src[range.clone()];
    let mut out = String::with_capacity(src.len() + fragment.len() + 16);
    out.push_str(&src[..range.start]);
    if element.ends_with("/>") {
        // `<sheets/>` has no closing tag to insert before.
        let name = qualified_name(src, node);
        out.push_str(element[..element.len() - 2].trim_end());
        out.push('>');
        out.push_str(fragment);
        let _ = write!(out, "</{name}>");
    } else {
        let close = element.rfind("</").unwrap_or(element.len());
        out.push_str(&element[..close]);
        out.push_str(fragment);
        out.push_str(&element[close..]);
    }
    out.push_str(&src[range.end..]);
    out
}

/// Insert `fragment` immediately before `node`.
pub(crate) fn insert_before(src: &str, node: Node, fragment: &str) -> String {
    let at = node.range().start;
    let mut out = String::with_capacity(src.len() + fragment.len());
    out.push_str(&src[..at]);
    out.push_str(fragment);
    out.push_str(&src[at..]);
    out
}

/// Rewrite a single attribute on the start tag of `node`.
pub(crate) fn replace_attr(src: &str, node: Node, name: &str, value: &str) -> String {
    let start = node.range().start;
    let end = start_tag_end(src, start);
    let tag_text = &src[start..end];
    let mut attrs = attributes(node);
    set_attr(&mut attrs, name, value);

    let self_closing = tag_text.ends_with("/>");
    let mut rebuilt = String::new();
    let _ = write!(rebuilt, "<{}", qualified_name(src, node));
    // Namespace declarations are not reported as attributes; carry them over verbatim.
    for decl in namespace_declarations(tag_text) {
        let _ = write!(rebuilt, " {decl}");
    }
    write_attrs(&mut rebuilt, &attrs);
    rebuilt.push_str(if self_closing { "/>" } else { ">" });

    let mut out = String::with_capacity(src.len() + 16);
    out.push_str(&src[..start]);
    out.push_str(&rebuilt);
    out.push_str(&src[end..]);
    out
}

fn namespace_declarations(tag_text: &str) -> Vec<&str> {
    let mut decls = Vec::new();
    let mut rest = tag_text;
    while let Some(pos) = rest.find("xmlns") {
        let before = rest[..pos].chars().last();
        let candidate = &rest[pos..];
        if !matches!(before, Some(c) if c.is_whitespace()) {
            rest = &candidate[5..];
            continue;
        }
        let Some(eq) = candidate.find('=') else { break };
        let after_eq = &candidate[eq + 1..];
        let Some(quote) = after_eq.chars().next() else { break };
        let Some(close) = after_eq[1..].find(quote) else { break };
        let len = eq + 1 + close + 2;
        decls.push(&candidate[..len]);
        rest = &candidate[len..];
    }
    decls
}
