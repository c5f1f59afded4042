//! Merge pipeline
//!
//! One merge is a single pass: resolve the share link, download, parse,
//! clone the template, map the export values, serialize, upload. Nothing is
//! resumed; a failed merge is retried by running it again from the start.

use std::collections::HashMap;
use std::fmt;

use log::{debug, error, info};
use uuid::Uuid;

use super::clone::clone_sheet_with;
use super::layout::RowLayout;
use super::mapper::{MappingReport, apply_layout};
use super::request::{ExportModel, MergeKind, MergeRequest, MergeResult};
use crate::api::{AccessToken, DocumentStore, GraphClient};
use crate::config::MergeConfig;
use crate::error::{ErrorKind, MergeError};
use crate::xlsx::{Workbook, sheet_name};

/// Pipeline position, used to report where a merge failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStage {
    Resolving,
    Fetching,
    Parsing,
    Cloning,
    Mapping,
    Serializing,
    Uploading,
    Done,
    /// Terminal; reachable from every other stage
    Failed(ErrorKind),
}

impl MergeStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, MergeStage::Done | MergeStage::Failed(_))
    }
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let MergeStage::Failed(kind) = self {
            return write!(f, "failed ({kind:?})");
        }
        f.write_str(match self {
            MergeStage::Resolving => "resolving",
            MergeStage::Fetching => "fetching",
            MergeStage::Parsing => "parsing",
            MergeStage::Cloning => "cloning",
            MergeStage::Mapping => "mapping",
            MergeStage::Serializing => "serializing",
            MergeStage::Uploading => "uploading",
            MergeStage::Done => "done",
            MergeStage::Failed(_) => "failed",
        })
    }
}

struct StageTracker {
    run_id: Uuid,
    stage: MergeStage,
}

impl StageTracker {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            stage: MergeStage::Resolving,
        }
    }

    fn enter(&mut self, stage: MergeStage) {
        debug!("[{}] {} -> {}", self.run_id, self.stage, stage);
        self.stage = stage;
    }

    /// Move to `Failed`, returning the stage the run failed in.
    fn fail(&mut self, err: &MergeError) -> MergeStage {
        let during = self.stage;
        self.enter(MergeStage::Failed(err.kind()));
        error!("[{}] Merge failed while {during}: {err}", self.run_id);
        during
    }
}

/// A workbook after clone and mapping, ready to upload or save
#[derive(Debug, Clone)]
pub struct MergedDocument {
    pub bytes: Vec<u8>,
    pub sheet_name: String,
    pub report: MappingReport,
}

pub struct Merger<S: DocumentStore> {
    store: S,
    config: MergeConfig,
    layouts: HashMap<MergeKind, RowLayout>,
}

impl Merger<GraphClient> {
    /// A merger talking to Microsoft Graph as configured
    pub fn from_config(config: MergeConfig) -> Result<Self, MergeError> {
        let client = GraphClient::new(&config)?;
        Ok(Self::new(client, config))
    }
}

impl<S: DocumentStore> Merger<S> {
    pub fn new(store: S, config: MergeConfig) -> Self {
        let layouts = [MergeKind::Teacher, MergeKind::Admin]
            .into_iter()
            .map(|kind| (kind, RowLayout::for_kind(kind)))
            .collect();
        Self {
            store,
            config,
            layouts,
        }
    }

    /// Replace the built-in layout for a kind
    pub fn with_layout(mut self, kind: MergeKind, layout: RowLayout) -> Self {
        self.layouts.insert(kind, layout);
        self
    }

    pub fn layout(&self, kind: MergeKind) -> &RowLayout {
        // Both kinds are inserted by `new` and never removed.
        &self.layouts[&kind]
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn merge(
        &self,
        request: MergeRequest,
        token: &AccessToken,
    ) -> Result<MergeResult, MergeError> {
        let mut tracker = StageTracker::new(Uuid::new_v4());
        info!(
            "[{}] Starting {} merge into sheet '{}'",
            tracker.run_id,
            request.kind(),
            request.target()
        );

        match self.run(&request, token, &mut tracker).await {
            Ok(result) => {
                tracker.enter(MergeStage::Done);
                info!(
                    "[{}] Merge complete: sheet '{}' ({} keys skipped)",
                    tracker.run_id,
                    result.sheet_name,
                    result.skipped_keys.len()
                );
                Ok(result)
            }
            Err(err) => {
                tracker.fail(&err);
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        request: &MergeRequest,
        token: &AccessToken,
        tracker: &mut StageTracker,
    ) -> Result<MergeResult, MergeError> {
        let item = self.store.resolve_share(request.share_url(), token).await?;

        tracker.enter(MergeStage::Fetching);
        let bytes = self.store.download(&item, token).await?;

        let merged = self.transform(
            &bytes,
            request.kind(),
            request.template(),
            request.target(),
            request.model(),
            tracker,
        )?;

        tracker.enter(MergeStage::Uploading);
        let upload = self.store.upload(&item, merged.bytes, token).await?;
        debug!(
            "[{}] Upload accepted with {} after {} attempt(s)",
            tracker.run_id, upload.status, upload.attempts
        );

        let base = item.web_url.as_deref().unwrap_or(request.share_url());
        Ok(MergeResult {
            sheet_url: deep_link(base, &merged.sheet_name),
            sheet_name: merged.sheet_name,
            skipped_keys: merged.report.skipped_keys,
        })
    }

    /// Clone and map a workbook held in memory. No network access.
    pub fn merge_bytes(
        &self,
        bytes: &[u8],
        kind: MergeKind,
        template: Option<&str>,
        target: &str,
        model: &ExportModel,
    ) -> Result<MergedDocument, MergeError> {
        let mut tracker = StageTracker::new(Uuid::new_v4());
        self.transform(bytes, kind, template, target, model, &mut tracker)
    }

    fn transform(
        &self,
        bytes: &[u8],
        kind: MergeKind,
        template: Option<&str>,
        target: &str,
        model: &ExportModel,
        tracker: &mut StageTracker,
    ) -> Result<MergedDocument, MergeError> {
        tracker.enter(MergeStage::Parsing);
        let mut workbook = Workbook::parse(bytes)?;

        tracker.enter(MergeStage::Cloning);
        let template = template.unwrap_or_else(|| self.config.templates.for_kind(kind));
        let sheet_name = clone_sheet_with(&mut workbook, template, target, self.config.collision)?;

        tracker.enter(MergeStage::Mapping);
        let report = apply_layout(&mut workbook, &sheet_name, self.layout(kind), model)?;

        tracker.enter(MergeStage::Serializing);
        let bytes = workbook.serialize()?;
        Ok(MergedDocument {
            bytes,
            sheet_name,
            report,
        })
    }
}

/// Link that opens the document with `sheet` active:
/// `{web_url}?activeCell='Sheet'!A1`, URL-encoded.
pub fn deep_link(web_url: &str, sheet: &str) -> String {
    let separator = if web_url.contains('?') { '&' } else { '?' };
    let anchor = format!("{}!A1", sheet_name::quote(sheet));
    format!("{web_url}{separator}activeCell={}", urlencoding::encode(&anchor))
}
