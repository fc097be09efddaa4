use super::TelemetryEvent;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Destination for telemetry events.
///
/// `emit` is fire-and-forget: implementations swallow their own failures.
pub trait TelemetrySink: Send + Sync {
    /// Records one event.
    fn emit(&self, event: TelemetryEvent);

    /// Releases resources; later events are dropped.
    fn dispose(&self) {}
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Sink that keeps events in memory, for tests and in-process statistics.
#[derive(Debug, Default)]
pub struct MemoryTelemetrySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemoryTelemetrySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events in emission order.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Recorded events with the given kind tag.
    pub fn events_of_kind(&self, kind: &str) -> Vec<TelemetryEvent> {
        self.events().into_iter().filter(|e| e.kind() == kind).collect()
    }
}

impl TelemetrySink for MemoryTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
    }
}

/// Sink appending one JSON object per line to a file.
pub struct JsonlTelemetrySink {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl std::fmt::Debug for JsonlTelemetrySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlTelemetrySink").field("path", &self.path).finish_non_exhaustive()
    }
}

impl JsonlTelemetrySink {
    /// Opens (or creates) the file at `path` for appending.
    ///
    /// # Errors
    /// Returns error if the parent directory or the file cannot be created.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file: Mutex::new(Some(file)) })
    }

    /// File the events are written to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TelemetrySink for JsonlTelemetrySink {
    fn emit(&self, event: TelemetryEvent) {
        let mut guard = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(file) = guard.as_mut() else {
            return;
        };
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                debug!(error = %e, kind = event.kind(), "Dropping unserializable telemetry event");
                return;
            }
        };
        if let Err(e) = writeln!(file, "{line}") {
            debug!(error = %e, path = %self.path.display(), "Telemetry write failed");
        }
    }

    fn dispose(&self) {
        let mut guard = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut file) = guard.take() {
            if let Err(e) = file.flush() {
                debug!(error = %e, "Telemetry flush failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn start_event(tool: &str) -> TelemetryEvent {
        TelemetryEvent::ToolStart {
            timestamp: Utc::now(),
            tool_id: tool.into(),
            speculative: false,
        }
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemoryTelemetrySink::new();
        sink.emit(start_event("lint"));
        sink.emit(start_event("commit"));
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(sink.events_of_kind("tool.start").len(), 2);
        assert!(sink.events_of_kind("tool.error").is_empty());
    }

    #[test]
    fn test_jsonl_sink_appends_lines_and_stops_after_dispose() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("telemetry.jsonl");
        let sink = JsonlTelemetrySink::open(&path).unwrap();

        sink.emit(start_event("lint"));
        sink.emit(start_event("tldr"));
        sink.dispose();
        sink.emit(start_event("ignored"));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: TelemetryEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.kind(), "tool.start");
        assert_eq!(sink.path(), path.as_path());
    }
}
