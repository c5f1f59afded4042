pub mod clone;
pub mod merge;

use std::path::Path;

use anyhow::{Context, Result};
use sheet_merge::merge::{ExportModel, MergeKind, RowLayout};
use sheet_merge::{GraphClient, MergeConfig, Merger};

/// Export model from a JSON file, or an empty one
pub(crate) fn read_model(path: Option<&Path>) -> Result<ExportModel> {
    let Some(path) = path else {
        return Ok(ExportModel::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read model file: {}", path.display()))?;
    ExportModel::from_json(&text)
        .with_context(|| format!("Invalid model file: {}", path.display()))
}

/// Merger built from the environment, with an optional layout override
pub(crate) fn build_merger(kind: MergeKind, layout: Option<&Path>) -> Result<Merger<GraphClient>> {
    let config = MergeConfig::from_env().context("Invalid SHEET_MERGE_* configuration")?;
    let merger = Merger::from_config(config).context("Failed to set up the Graph client")?;
    match layout {
        Some(path) => {
            let layout = RowLayout::load(path)
                .with_context(|| format!("Failed to load layout: {}", path.display()))?;
            Ok(merger.with_layout(kind, layout))
        }
        None => Ok(merger),
    }
}
