//! Sheet cloning
//!
//! A clone carries the template's columns, rows and cells (styled blanks
//! included), merged ranges, conditional formats, data validations, page
//! margins and setup, and sheet-scoped names. Elements pointing at other
//! package parts (drawings, tables, comments) stay with the template.

use std::fmt;
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::MergeError;
use crate::xlsx::worksheet::RawElement;
use crate::xlsx::{Sheet, Workbook, XlsxError, sheet_name};

/// Highest suffix tried before giving up on a free name
const MAX_SUFFIX: u32 = 999;

/// What to do when the target sheet name is taken
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Fail with [`MergeError::SheetExists`]
    #[default]
    Reject,
    /// Use the first free `Name (2)`, `Name (3)`, ...
    Suffix,
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CollisionPolicy::Reject => "reject",
            CollisionPolicy::Suffix => "suffix",
        })
    }
}

impl FromStr for CollisionPolicy {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(CollisionPolicy::Reject),
            "suffix" => Ok(CollisionPolicy::Suffix),
            other => Err(MergeError::Configuration(format!(
                "unknown collision policy '{other}' (expected reject or suffix)"
            ))),
        }
    }
}

/// Clone `template` into a new sheet named `target`, failing if the name is taken.
pub fn clone_sheet<'a>(
    workbook: &'a mut Workbook,
    template: &str,
    target: &str,
) -> Result<&'a mut Sheet, MergeError> {
    let name = clone_sheet_with(workbook, template, target, CollisionPolicy::Reject)?;
    workbook
        .sheet_mut(&name)
        .ok_or_else(|| XlsxError::Invalid(format!("cloned sheet '{name}' is missing")).into())
}

/// Clone `template` into a new last tab and return the name it was given,
/// which differs from `target` only under [`CollisionPolicy::Suffix`].
pub fn clone_sheet_with(
    workbook: &mut Workbook,
    template: &str,
    target: &str,
    policy: CollisionPolicy,
) -> Result<String, MergeError> {
    sheet_name::validate(target).map_err(|source| MergeError::InvalidSheetName {
        name: target.to_string(),
        source,
    })?;
    let source = workbook
        .sheet(template)
        .ok_or_else(|| MergeError::TemplateNotFound(template.to_string()))?;
    let name = free_name(workbook, target, policy)?;

    let copy = copy_of(source);
    debug!(
        "Cloning '{template}' to '{name}': {} rows, {} merged ranges, {} conditional formats, {} validations",
        copy.rows.len(),
        copy.merged.len(),
        copy.conditional_formats.len(),
        copy.validations.len()
    );

    workbook.add_sheet(&name, copy)?;
    let names = workbook.copy_local_names(template, &name)?;
    info!("Cloned sheet '{template}' to '{name}' ({names} sheet-scoped names)");
    Ok(name)
}

fn free_name(workbook: &Workbook, target: &str, policy: CollisionPolicy) -> Result<String, MergeError> {
    if !workbook.contains_sheet(target) {
        return Ok(target.to_string());
    }
    match policy {
        CollisionPolicy::Reject => Err(MergeError::SheetExists(target.to_string())),
        CollisionPolicy::Suffix => (2..=MAX_SUFFIX)
            .map(|n| sheet_name::with_suffix(target, n))
            .find(|candidate| !workbook.contains_sheet(candidate))
            .ok_or_else(|| MergeError::SheetExists(target.to_string())),
    }
}

fn copy_of(template: &Sheet) -> Sheet {
    let mut copy = Sheet::empty_like(template);
    copy.columns = template.columns.clone();
    copy.rows = template.rows.clone();
    copy.merged = template.merged.clone();
    copy.conditional_formats = template.conditional_formats.clone();
    copy.validations = template.validations.clone();
    copy.set_validations_attrs(template.validations_attrs().to_vec());
    copy.page_margins = template.page_margins;
    copy.page_setup = template.page_setup.as_ref().map(|setup| setup.without_relationships());

    for element in template.extras() {
        let xml = match (&element.portable, element.has_relationship) {
            (Some(portable), true) => {
                debug!("Cloning <{}> without the entries that refer to another part", element.name);
                portable.clone()
            }
            (None, true) => {
                debug!("Not cloning <{}>: it refers to another part", element.name);
                continue;
            }
            _ if element.name == "sheetViews" => clear_tab_selected(&element.xml),
            _ => element.xml.clone(),
        };
        copy.push_extra(RawElement {
            name: element.name.clone(),
            xml,
            has_relationship: false,
            portable: None,
        });
    }
    copy
}

/// Only one tab may be selected; the clone is added unselected.
fn clear_tab_selected(xml: &str) -> String {
    [
        r#" tabSelected="1""#,
        r#" tabSelected="true""#,
        " tabSelected='1'",
        " tabSelected='true'",
    ]
    .iter()
    .fold(xml.to_string(), |acc, attr| acc.replace(attr, ""))
}
