use async_trait::async_trait;
use ignore::WalkBuilder;
use regex::Regex;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::batch::BatchSlot;
use crate::error::ToolError;
use crate::run::RunContext;
use crate::tool::{FindingDraft, Location, ScanOptions, Severity, Tool, ToolId};

const MARKER_PATTERN: &str = r"\b(TODO|FIXME|HACK|XXX)\b[\s:(\-]*(.*)";

/// Files larger than this are skipped.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 1024 * 1024;

/// Reports `TODO`, `FIXME`, `HACK` and `XXX` markers.
#[derive(Debug, Clone)]
pub struct CommentsTool {
    max_file_bytes: u64,
}

impl Default for CommentsTool {
    fn default() -> Self {
        Self::new()
    }
}

impl CommentsTool {
    #[must_use]
    pub const fn new() -> Self {
        Self { max_file_bytes: DEFAULT_MAX_FILE_BYTES }
    }

    #[must_use]
    pub const fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }
}

#[async_trait]
impl Tool for CommentsTool {
    fn id(&self) -> ToolId {
        ToolId::Comments
    }

    async fn analyze(&self, cx: &RunContext, options: &ScanOptions) -> Result<(), ToolError> {
        let root = cx.workspace_root().to_path_buf();
        let scan_root = options.scan_root(&root);
        let max_file_bytes = self.max_file_bytes;
        let walk_root = root.clone();
        let files = tokio::task::spawn_blocking(move || {
            collect_files(&walk_root, &scan_root, max_file_bytes)
        })
        .await
        .map_err(|err| ToolError::Other(format!("file walk failed: {err}")))?;
        cx.checkpoint()?;

        let marker = Regex::new(MARKER_PATTERN).map_err(|err| ToolError::Other(err.to_string()))?;
        let (marker, root) = (&marker, &root);
        let slots = cx
            .batch(files, |relative| async move {
                let content = match tokio::fs::read_to_string(root.join(&relative)).await {
                    Ok(content) => content,
                    // binary or non-UTF-8 content
                    Err(err) if err.kind() == ErrorKind::InvalidData => return Ok(None),
                    Err(err) => return Err(ToolError::Io(err)),
                };
                Ok(Some(scan_markers(marker, &relative, &content)))
            })
            .await;

        for slot in slots {
            if let BatchSlot::Done(Some(drafts)) = slot {
                cx.add_files_scanned(1);
                drafts.into_iter().for_each(|draft| cx.report_draft(draft));
            }
        }
        cx.checkpoint()
    }
}

/// Lists files under `scan_root`, relative to `root`, honouring ignore files.
fn collect_files(root: &Path, scan_root: &Path, max_file_bytes: u64) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkBuilder::new(scan_root)
        .require_git(false)
        .build()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter(|entry| entry.metadata().is_ok_and(|meta| meta.len() <= max_file_bytes))
        .map(|entry| entry.path().strip_prefix(root).unwrap_or(entry.path()).to_path_buf())
        .collect();
    files.sort();
    files
}

fn scan_markers(marker: &Regex, path: &Path, content: &str) -> Vec<FindingDraft> {
    content
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let captures = marker.captures(line)?;
            let kind = captures.get(1)?.as_str();
            let text = captures.get(2).map_or("", |m| m.as_str()).trim();
            let severity = match kind {
                "FIXME" | "HACK" => Severity::Warning,
                _ => Severity::Info,
            };
            let title = if text.is_empty() { kind.to_string() } else { format!("{kind}: {text}") };
            let line_number = u32::try_from(index + 1).unwrap_or(u32::MAX);
            Some(
                FindingDraft::new(severity, title)
                    .description(line.trim().to_string())
                    .at(Location::line(path, line_number))
                    .meta("marker", kind),
            )
        })
        .collect()
}
