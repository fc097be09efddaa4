use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of telemetry events emitted by the orchestration layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TelemetryEvent {
    /// A tool run started.
    #[serde(rename = "tool.start")]
    ToolStart {
        timestamp: DateTime<Utc>,
        tool_id: String,
        /// Whether the run was started by the speculative trigger.
        speculative: bool,
    },

    /// A tool run reached a non-failed terminal state.
    #[serde(rename = "tool.complete")]
    ToolComplete {
        timestamp: DateTime<Utc>,
        tool_id: String,
        status: String,
        duration_ms: u64,
        finding_count: usize,
        files_scanned: usize,
    },

    /// A tool run failed.
    #[serde(rename = "tool.error")]
    ToolError {
        timestamp: DateTime<Utc>,
        tool_id: String,
        error: String,
        duration_ms: u64,
    },

    /// A matched workflow (one interaction turn) started.
    #[serde(rename = "workflow.start")]
    WorkflowStart {
        timestamp: DateTime<Utc>,
        workflow_id: String,
        tool_count: usize,
    },

    /// A matched workflow finished.
    #[serde(rename = "workflow.complete")]
    WorkflowComplete {
        timestamp: DateTime<Utc>,
        workflow_id: String,
        duration_ms: u64,
        success: bool,
    },

    /// The user acted on a finding (applied a fix, dismissed it, ...).
    #[serde(rename = "finding.acted")]
    FindingActed {
        timestamp: DateTime<Utc>,
        tool_id: String,
        finding_id: String,
        action: String,
    },

    /// A speculative result was available when needed.
    #[serde(rename = "speculative.hit")]
    SpeculativeHit {
        timestamp: DateTime<Utc>,
        tool_id: String,
        /// Wall-clock time between the speculative start and the need.
        saved_ms: u64,
    },

    /// A needed tool had no usable speculative entry.
    #[serde(rename = "speculative.miss")]
    SpeculativeMiss {
        timestamp: DateTime<Utc>,
        tool_id: String,
        reason: String,
    },

    /// A request was decomposed into workflow steps.
    #[serde(rename = "decompose.complete")]
    DecomposeComplete {
        timestamp: DateTime<Utc>,
        workflow_id: String,
        step_count: usize,
        duration_ms: u64,
    },
}

impl TelemetryEvent {
    /// The stable kind tag (e.g., "tool.start").
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ToolStart { .. } => "tool.start",
            Self::ToolComplete { .. } => "tool.complete",
            Self::ToolError { .. } => "tool.error",
            Self::WorkflowStart { .. } => "workflow.start",
            Self::WorkflowComplete { .. } => "workflow.complete",
            Self::FindingActed { .. } => "finding.acted",
            Self::SpeculativeHit { .. } => "speculative.hit",
            Self::SpeculativeMiss { .. } => "speculative.miss",
            Self::DecomposeComplete { .. } => "decompose.complete",
        }
    }

    /// When the event was produced.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ToolStart { timestamp, .. }
            | Self::ToolComplete { timestamp, .. }
            | Self::ToolError { timestamp, .. }
            | Self::WorkflowStart { timestamp, .. }
            | Self::WorkflowComplete { timestamp, .. }
            | Self::FindingActed { timestamp, .. }
            | Self::SpeculativeHit { timestamp, .. }
            | Self::SpeculativeMiss { timestamp, .. }
            | Self::DecomposeComplete { timestamp, .. } => *timestamp,
        }
    }
}
