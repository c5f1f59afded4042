//! `merge`: the full download, clone, fill and upload cycle

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use log::info;
use sheet_merge::AccessToken;
use sheet_merge::merge::{MergeKind, MergeRequest};

use super::{build_merger, read_model};

pub const ENV_TOKEN: &str = "SHEET_MERGE_TOKEN";

#[derive(Args)]
pub struct MergeArgs {
    /// Which template and layout to use
    #[arg(long, value_enum)]
    pub kind: MergeKind,

    /// Sharing link of the workbook
    #[arg(long)]
    pub share_url: String,

    /// Name of the sheet to create
    #[arg(long)]
    pub target: String,

    /// JSON file with header and indicator values
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Template sheet to copy instead of the configured default
    #[arg(long)]
    pub template: Option<String>,

    /// TOML layout replacing the built-in one for this kind
    #[arg(long)]
    pub layout: Option<PathBuf>,

    /// Bearer token; falls back to SHEET_MERGE_TOKEN
    #[arg(long)]
    pub token: Option<String>,
}

pub async fn handle_merge_command(args: MergeArgs) -> Result<()> {
    let token = match args.token {
        Some(token) => token,
        None => std::env::var(ENV_TOKEN)
            .with_context(|| format!("No access token: pass --token or set {ENV_TOKEN}"))?,
    };
    let token = AccessToken::new(token)?;

    let model = read_model(args.model.as_deref())?;
    let mut request = MergeRequest::new(args.kind, args.share_url, args.target, model)?;
    if let Some(template) = args.template {
        request = request.with_template(template)?;
    }

    let merger = build_merger(args.kind, args.layout.as_deref())?;
    let result = match merger.merge(request, &token).await {
        Ok(result) => result,
        Err(err) => {
            let message = err.user_message();
            return Err(anyhow::Error::new(err).context(message));
        }
    };

    if !result.skipped_keys.is_empty() {
        info!("Keys with no place in the layout: {}", result.skipped_keys.join(", "));
    }
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
