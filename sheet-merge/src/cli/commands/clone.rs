//! `clone`: the offline clone and fill cycle against a local file

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use sheet_merge::merge::MergeKind;

use super::{build_merger, read_model};

#[derive(Args)]
pub struct CloneArgs {
    /// Workbook to read
    #[arg(long)]
    pub input: PathBuf,

    /// Where to write the result; may equal --input
    #[arg(long)]
    pub output: PathBuf,

    /// Name of the sheet to create
    #[arg(long)]
    pub target: String,

    /// Template sheet to copy instead of the configured default
    #[arg(long)]
    pub template: Option<String>,

    /// JSON file with header and indicator values
    #[arg(long)]
    pub model: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "teacher")]
    pub kind: MergeKind,

    /// TOML layout replacing the built-in one for this kind
    #[arg(long)]
    pub layout: Option<PathBuf>,
}

pub fn handle_clone_command(args: CloneArgs) -> Result<()> {
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read workbook: {}", args.input.display()))?;
    let model = read_model(args.model.as_deref())?;
    let merger = build_merger(args.kind, args.layout.as_deref())?;

    let merged = merger
        .merge_bytes(
            &bytes,
            args.kind,
            args.template.as_deref(),
            args.target.trim(),
            &model,
        )
        .with_context(|| format!("Failed to merge into {}", args.input.display()))?;

    std::fs::write(&args.output, &merged.bytes)
        .with_context(|| format!("Failed to write workbook: {}", args.output.display()))?;

    let summary = json!({
        "output": args.output.display().to_string(),
        "sheet_name": merged.sheet_name,
        "report": merged.report,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
