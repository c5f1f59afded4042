//! Merge requests and results
//!
//! Input is normalized and validated once, when a [`MergeRequest`] is built.
//! Nothing past this point re-checks field names or shapes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::layout::FieldRole;
use crate::error::MergeError;
use crate::xlsx::CellValue;
use crate::xlsx::sheet_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MergeKind {
    Teacher,
    Admin,
}

impl fmt::Display for MergeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MergeKind::Teacher => "teacher",
            MergeKind::Admin => "admin",
        })
    }
}

impl FromStr for MergeKind {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "teacher" => Ok(MergeKind::Teacher),
            "admin" => Ok(MergeKind::Admin),
            other => Err(MergeError::InvalidRequest(format!(
                "unknown merge kind '{other}' (expected teacher or admin)"
            ))),
        }
    }
}

/// A rating as entered: a score or a label such as "Proficient".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rating {
    Score(f64),
    Label(String),
}

impl Rating {
    /// Scores are written as numbers, including scores that arrive as text.
    /// A cell cannot hold NaN or infinity: such scores are not written, and
    /// such labels stay text.
    fn to_cell_value(&self) -> Option<CellValue> {
        match self {
            Rating::Score(score) if score.is_finite() => Some(CellValue::Number(*score)),
            Rating::Score(_) => None,
            Rating::Label(label) => {
                let label = label.trim();
                if label.is_empty() {
                    return None;
                }
                match label.parse::<f64>() {
                    Ok(score) if score.is_finite() => Some(CellValue::Number(score)),
                    _ => Some(CellValue::text(label)),
                }
            }
        }
    }
}

/// Field values for one indicator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndicatorValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strengths: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth: Option<String>,
}

impl IndicatorValues {
    /// The value to write for a role; `None` when the field is absent or blank.
    pub fn value(&self, role: FieldRole) -> Option<CellValue> {
        let text = |field: &Option<String>| {
            field
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(CellValue::text)
        };
        match role {
            FieldRole::Label => text(&self.label),
            FieldRole::Description => text(&self.description),
            FieldRole::Rating => self.rating.as_ref().and_then(Rating::to_cell_value),
            FieldRole::Strengths => text(&self.strengths),
            FieldRole::Growth => text(&self.growth),
        }
    }
}

/// Observation data to merge: header fields plus values per indicator key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportModel {
    #[serde(default)]
    pub header: BTreeMap<String, String>,
    #[serde(default)]
    pub indicators: BTreeMap<String, IndicatorValues>,
}

impl ExportModel {
    pub fn from_json(text: &str) -> Result<Self, MergeError> {
        serde_json::from_str(text)
            .map_err(|e| MergeError::InvalidRequest(format!("invalid export model: {e}")))
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }

    pub fn with_indicator(mut self, key: impl Into<String>, values: IndicatorValues) -> Self {
        self.indicators.insert(key.into(), values);
        self
    }
}

/// Merge input as it arrives from a caller, before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeInput {
    pub kind: MergeKind,
    pub share_url: String,
    #[serde(default)]
    pub template: Option<String>,
    pub target: String,
    #[serde(default)]
    pub model: ExportModel,
}

/// A validated merge request
#[derive(Debug, Clone, PartialEq)]
pub struct MergeRequest {
    kind: MergeKind,
    share_url: String,
    template: Option<String>,
    target: String,
    model: ExportModel,
}

impl MergeRequest {
    /// Fails on a missing or non-http share link and on a target name Excel
    /// would refuse. Runs before any network call.
    pub fn new(
        kind: MergeKind,
        share_url: impl Into<String>,
        target: impl Into<String>,
        model: ExportModel,
    ) -> Result<Self, MergeError> {
        let share_url = share_url.into().trim().to_string();
        if share_url.is_empty() {
            return Err(MergeError::InvalidRequest("share link is empty".to_string()));
        }
        if !(share_url.starts_with("https://") || share_url.starts_with("http://")) {
            return Err(MergeError::InvalidRequest(format!(
                "share link must be an http(s) URL, got '{share_url}'"
            )));
        }

        let target = target.into().trim().to_string();
        sheet_name::validate(&target).map_err(|source| MergeError::InvalidSheetName {
            name: target.clone(),
            source,
        })?;

        Ok(Self {
            kind,
            share_url,
            template: None,
            target,
            model,
        })
    }

    /// Use a specific template sheet instead of the configured default.
    pub fn with_template(mut self, template: impl Into<String>) -> Result<Self, MergeError> {
        let template = template.into().trim().to_string();
        if template.is_empty() {
            return Err(MergeError::InvalidRequest("template sheet name is empty".to_string()));
        }
        self.template = Some(template);
        Ok(self)
    }

    pub fn kind(&self) -> MergeKind {
        self.kind
    }

    pub fn share_url(&self) -> &str {
        &self.share_url
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn model(&self) -> &ExportModel {
        &self.model
    }
}

impl TryFrom<MergeInput> for MergeRequest {
    type Error = MergeError;

    fn try_from(input: MergeInput) -> Result<Self, Self::Error> {
        let request = MergeRequest::new(input.kind, input.share_url, input.target, input.model)?;
        match input.template {
            Some(template) if !template.trim().is_empty() => request.with_template(template),
            _ => Ok(request),
        }
    }
}

/// What a successful merge hands back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    /// Link that opens the document on the new sheet
    pub sheet_url: String,
    /// Final sheet name, which differs from the requested one under the suffix policy
    pub sheet_name: String,
    /// Header and indicator keys the layout had no place for
    pub skipped_keys: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_rating_never_writes_non_finite_numbers() {
        let label = |text: &str| Rating::Label(text.to_string()).to_cell_value();

        assert_eq!(label(" 3 "), Some(CellValue::Number(3.0)));
        assert_eq!(label("Proficient"), Some(CellValue::text("Proficient")));
        for text in ["NaN", "inf", "-Infinity", "1e400"] {
            assert_eq!(label(text), Some(CellValue::text(text)), "{text}");
        }
        assert_eq!(Rating::Score(f64::NAN).to_cell_value(), None);
        assert_eq!(Rating::Score(f64::INFINITY).to_cell_value(), None);
        assert_eq!(Rating::Score(2.5).to_cell_value(), Some(CellValue::Number(2.5)));
    }

    #[test]
    fn test_request_normalizes_once() {
        let request = MergeRequest::new(
            MergeKind::Teacher,
            "  https://1drv.ms/x/s!abc  ",
            " 03.2025 ",
            ExportModel::default(),
        )
        .unwrap();
        assert_eq!(request.share_url(), "https://1drv.ms/x/s!abc");
        assert_eq!(request.target(), "03.2025");
        assert_eq!(request.template(), None);
    }

    #[test]
    fn test_request_rejects_bad_names_and_links() {
        let err = MergeRequest::new(
            MergeKind::Teacher,
            "https://1drv.ms/x/s!abc",
            "03/2025",
            ExportModel::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSheetName);

        let err = MergeRequest::new(
            MergeKind::Admin,
            "https://1drv.ms/x/s!abc",
            "x".repeat(32),
            ExportModel::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSheetName);

        let err = MergeRequest::new(MergeKind::Admin, "", "03.2025", ExportModel::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_model_parses_ratings_as_numbers_or_labels() {
        let model = ExportModel::from_json(
            r#"{
                "header": {"teacher_name": "Jane Doe"},
                "indicators": {
                    "1a": {"rating": 3, "strengths": "Clear objectives"},
                    "1b": {"rating": "4"},
                    "1c": {"rating": "Proficient", "growth": "  "}
                }
            }"#,
        )
        .unwrap();

        let value = |key: &str, role| model.indicators[key].value(role);
        assert_eq!(value("1a", FieldRole::Rating), Some(CellValue::Number(3.0)));
        assert_eq!(value("1b", FieldRole::Rating), Some(CellValue::Number(4.0)));
        assert_eq!(
            value("1c", FieldRole::Rating),
            Some(CellValue::text("Proficient"))
        );
        assert_eq!(value("1c", FieldRole::Growth), None);
        assert_eq!(
            value("1a", FieldRole::Strengths),
            Some(CellValue::text("Clear objectives"))
        );
    }

    #[test]
    fn test_model_rejects_unknown_field_names() {
        let err = ExportModel::from_json(r#"{"indicators": {"1a": {"score": 3}}}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_input_converts_to_request() {
        let input: MergeInput = serde_json::from_str(
            r#"{"kind":"admin","share_url":"https://1drv.ms/x/s!abc","template":"Coaching","target":"Jane 03.2025 Coaching"}"#,
        )
        .unwrap();
        let request = MergeRequest::try_from(input).unwrap();
        assert_eq!(request.kind(), MergeKind::Admin);
        assert_eq!(request.template(), Some("Coaching"));
        assert!("Teacher".parse::<MergeKind>().is_ok());
        assert!("student".parse::<MergeKind>().is_err());
    }
}
