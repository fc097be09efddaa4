use super::TelemetryEvent;
use serde::{Deserialize, Serialize};

/// Aggregate statistics computed from a stream of telemetry events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryStats {
    /// Tool runs started.
    pub runs_started: usize,
    /// Tool runs that ended completed or cancelled.
    pub runs_completed: usize,
    /// Tool runs that failed.
    pub runs_failed: usize,
    /// Speculative results consumed.
    pub speculative_hits: usize,
    /// Needed tools with no usable speculative result.
    pub speculative_misses: usize,
    /// Total wall-clock time saved by speculative hits.
    pub saved_ms: u64,
    /// Findings the user acted on.
    pub findings_acted: usize,
}

impl TelemetryStats {
    /// Folds `events` into a statistics snapshot.
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a TelemetryEvent>) -> Self {
        let mut stats = Self::default();
        for event in events {
            match event {
                TelemetryEvent::ToolStart { .. } => stats.runs_started += 1,
                TelemetryEvent::ToolComplete { .. } => stats.runs_completed += 1,
                TelemetryEvent::ToolError { .. } => stats.runs_failed += 1,
                TelemetryEvent::SpeculativeHit { saved_ms, .. } => {
                    stats.speculative_hits += 1;
                    stats.saved_ms += saved_ms;
                }
                TelemetryEvent::SpeculativeMiss { .. } => stats.speculative_misses += 1,
                TelemetryEvent::FindingActed { .. } => stats.findings_acted += 1,
                TelemetryEvent::WorkflowStart { .. }
                | TelemetryEvent::WorkflowComplete { .. }
                | TelemetryEvent::DecomposeComplete { .. } => {}
            }
        }
        stats
    }

    /// Fraction of speculative lookups that were hits, or `None` with no lookups.
    pub fn hit_rate(&self) -> Option<f64> {
        let total = self.speculative_hits + self.speculative_misses;
        (total > 0).then(|| self.speculative_hits as f64 / total as f64)
    }
}
