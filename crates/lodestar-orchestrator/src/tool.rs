//! Tool contract and the data it produces.
//!
//! A tool is a self-contained analysis unit. It never builds its own
//! [`ScanResult`]: the run harness in [`crate::run`] owns the lifecycle and
//! assembles the result from whatever the tool reported through its
//! [`RunContext`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::run::RunContext;

/// Identifier of a registered tool. Stable, used as a map key everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolId {
    DeadCode,
    Lint,
    Commit,
    Comments,
    Tldr,
    BranchDiff,
    DiffResolve,
    PrReview,
}

impl ToolId {
    /// All known tool ids in display order.
    pub const ALL: [Self; 8] = [
        Self::DeadCode,
        Self::Lint,
        Self::Commit,
        Self::Comments,
        Self::Tldr,
        Self::BranchDiff,
        Self::DiffResolve,
        Self::PrReview,
    ];

    /// Returns the kebab-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeadCode => "dead-code",
            Self::Lint => "lint",
            Self::Commit => "commit",
            Self::Comments => "comments",
            Self::Tldr => "tldr",
            Self::BranchDiff => "branch-diff",
            Self::DiffResolve => "diff-resolve",
            Self::PrReview => "pr-review",
        }
    }

    /// Whether the tool only reads the repository.
    ///
    /// Only read-only tools may be started speculatively.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        !matches!(self, Self::Commit | Self::DiffResolve)
    }

    /// The pipeline command name used when this tool is invoked.
    #[must_use]
    pub const fn command_name(self) -> &'static str {
        match self {
            Self::DeadCode => "tools.dead-code",
            Self::Lint => "tools.lint",
            Self::Commit => "git.commit",
            Self::Comments => "tools.comments",
            Self::Tldr => "tools.tldr",
            Self::BranchDiff => "tools.branch-diff",
            Self::DiffResolve => "git.resolveConflicts",
            Self::PrReview => "tools.pr-review",
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unknown tool name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown tool id '{0}'")]
pub struct ParseToolIdError(pub String);

impl FromStr for ToolId {
    type Err = ParseToolIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| ParseToolIdError(s.to_string()))
    }
}

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
            Self::Hint => write!(f, "hint"),
        }
    }
}

/// A file path plus an inclusive, 1-based line range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: PathBuf,
    pub start_line: u32,
    pub end_line: u32,
}

impl Location {
    /// A single-line location.
    pub fn line(path: impl Into<PathBuf>, line: u32) -> Self {
        Self { path: path.into(), start_line: line, end_line: line }
    }

    /// A location covering `start..=end`.
    pub fn span(path: impl Into<PathBuf>, start_line: u32, end_line: u32) -> Self {
        Self { path: path.into(), start_line, end_line: end_line.max(start_line) }
    }

    /// A location pointing at a whole file.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::line(path, 1)
    }
}

/// A fix a tool proposes for a finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedFix {
    pub description: String,
    /// Replacement text for the finding's location, when the fix is mechanical.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

/// One reported issue.
///
/// Only [`RunContext::create_finding`] builds these, so `id` and `tool_id`
/// are always consistent with the run that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub tool_id: ToolId,
    pub title: String,
    pub description: String,
    pub location: Option<Location>,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<SuggestedFix>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// A finding before the harness assigns its id and owning tool.
#[derive(Debug, Clone, PartialEq)]
pub struct FindingDraft {
    pub title: String,
    pub description: String,
    pub location: Option<Location>,
    pub severity: Severity,
    pub suggested_fix: Option<SuggestedFix>,
    pub metadata: Map<String, Value>,
}

impl FindingDraft {
    pub fn new(severity: Severity, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            location: None,
            severity,
            suggested_fix: None,
            metadata: Map::new(),
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    #[must_use]
    pub fn fix(mut self, fix: SuggestedFix) -> Self {
        self.suggested_fix = Some(fix);
        self
    }

    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Per-invocation input. Immutable for the duration of one run.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Restricts the scan to this file or directory.
    pub path: Option<PathBuf>,
    /// External cancellation signal, in addition to the run's own.
    pub cancellation: Option<CancellationToken>,
    /// Tool-specific parameters.
    pub args: Map<String, Value>,
}

impl ScanOptions {
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Returns a string argument, if present and a string.
    #[must_use]
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    /// Resolves the path filter against `root`, defaulting to `root` itself.
    #[must_use]
    pub fn scan_root(&self, root: &Path) -> PathBuf {
        match &self.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root.join(path),
            None => root.to_path_buf(),
        }
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Aggregate counts for a result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total: usize,
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub hints: usize,
    pub files_scanned: usize,
}

impl ScanSummary {
    #[must_use]
    pub fn from_findings(findings: &[Finding], files_scanned: usize) -> Self {
        let mut summary = Self { total: findings.len(), files_scanned, ..Self::default() };
        for finding in findings {
            match finding.severity {
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Info => summary.infos += 1,
                Severity::Hint => summary.hints += 1,
            }
        }
        summary
    }
}

/// The complete, immutable outcome of one tool run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub tool_id: ToolId,
    pub status: ScanStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub findings: Vec<Finding>,
    pub summary: ScanSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanResult {
    /// A `failed` result for a run whose tool logic never executed.
    pub fn failed_before_start(tool_id: ToolId, error: impl Into<String>) -> Self {
        Self::empty(tool_id, ScanStatus::Failed, Some(error.into()))
    }

    /// A `cancelled` result with no findings, for a run abandoned before
    /// its tool reported anything.
    pub fn cancelled_before_start(tool_id: ToolId) -> Self {
        Self::empty(tool_id, ScanStatus::Cancelled, None)
    }

    fn empty(tool_id: ToolId, status: ScanStatus, error: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            tool_id,
            status,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            findings: Vec::new(),
            summary: ScanSummary::default(),
            error,
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == ScanStatus::Failed
    }
}

/// A polymorphic analysis unit.
///
/// Implementations report findings through `cx` and call
/// [`RunContext::checkpoint`] between expensive phases. Returning
/// `Err(ToolError::Cancelled)` ends the run as `cancelled`; any other error
/// ends it as `failed`.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The id this tool is registered under.
    fn id(&self) -> ToolId;

    /// Runs the tool's own analysis logic.
    async fn analyze(&self, cx: &RunContext, options: &ScanOptions) -> Result<(), ToolError>;
}
