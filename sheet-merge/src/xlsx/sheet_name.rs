//! Worksheet name rules
//!
//! Excel rejects names that are empty, longer than 31 characters, contain any of
//! `: \ / ? * [ ]`, start or end with an apostrophe, or equal `History`.
//! The merge engine validates the names it is given and never renames silently;
//! the builders here are for callers deriving names from observation data.

use chrono::NaiveDate;
use thiserror::Error;

pub const MAX_SHEET_NAME_LEN: usize = 31;
pub const FORBIDDEN_CHARS: [char; 7] = [':', '\\', '/', '?', '*', '[', ']'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SheetNameError {
    #[error("sheet name is empty")]
    Empty,
    #[error("sheet name is {len} characters long (max {MAX_SHEET_NAME_LEN})")]
    TooLong { len: usize },
    #[error("sheet name contains forbidden character '{0}'")]
    ForbiddenChar(char),
    #[error("sheet name cannot start or end with an apostrophe")]
    EdgeApostrophe,
    #[error("'History' is reserved by Excel")]
    Reserved,
}

pub fn validate(name: &str) -> Result<(), SheetNameError> {
    if name.trim().is_empty() {
        return Err(SheetNameError::Empty);
    }
    let len = name.chars().count();
    if len > MAX_SHEET_NAME_LEN {
        return Err(SheetNameError::TooLong { len });
    }
    if let Some(ch) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(SheetNameError::ForbiddenChar(ch));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(SheetNameError::EdgeApostrophe);
    }
    if name.eq_ignore_ascii_case("history") {
        return Err(SheetNameError::Reserved);
    }
    Ok(())
}

/// Excel compares sheet names without regard to case.
pub fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Make an arbitrary string usable as a sheet name: forbidden characters become
/// `-`, edge apostrophes and whitespace are trimmed, and the result is cut to 31
/// characters.
pub fn sanitize(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if FORBIDDEN_CHARS.contains(&c) { '-' } else { c })
        .collect();
    let trimmed = replaced.trim().trim_matches('\'').trim();
    let mut name = truncate(trimmed, MAX_SHEET_NAME_LEN).trim_end().to_string();
    while name.ends_with('\'') {
        name.pop();
    }
    if name.is_empty() || name.eq_ignore_ascii_case("history") {
        return "Sheet".to_string();
    }
    name
}

/// `base (n)`, with `base` shortened so the whole name stays within 31 characters.
pub fn with_suffix(base: &str, n: u32) -> String {
    let suffix = format!(" ({n})");
    let room = MAX_SHEET_NAME_LEN.saturating_sub(suffix.chars().count());
    format!("{}{}", truncate(base, room).trim_end(), suffix)
}

/// Quote a sheet name for use in a formula or cell anchor: `'Jan ''25'`.
pub fn quote(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

/// Teacher sheets are named after the observation month: `MM.YYYY`.
pub fn teacher_sheet_name(date: NaiveDate) -> String {
    date.format("%m.%Y").to_string()
}

/// Admin sheets: `TeacherName MM.YYYY SupportType`.
pub fn admin_sheet_name(teacher: &str, date: NaiveDate, support_type: &str) -> String {
    let raw = format!(
        "{} {} {}",
        teacher.trim(),
        date.format("%m.%Y"),
        support_type.trim()
    );
    sanitize(&raw)
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
