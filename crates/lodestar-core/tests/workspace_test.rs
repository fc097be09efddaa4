//! Workspace config discovery and telemetry log persistence.

use chrono::Utc;
use lodestar_core::{
    JsonlTelemetrySink, LodestarConfig, TelemetryEvent, TelemetrySink, TelemetryStats,
};
use tempfile::TempDir;

#[test]
fn test_discover_reads_workspace_config() {
    let dir = TempDir::new().unwrap();
    assert_eq!(LodestarConfig::discover(dir.path()).unwrap(), LodestarConfig::default());

    let path = LodestarConfig::config_path(dir.path());
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        "[lodestar.tools]\nbatch_concurrency = 2\n\n[lodestar.telemetry]\npath = \"events.jsonl\"\n",
    )
    .unwrap();

    let config = LodestarConfig::discover(dir.path()).unwrap();
    assert_eq!(config.tools.batch_concurrency, 2);
    assert_eq!(config.telemetry.path.as_deref(), Some(std::path::Path::new("events.jsonl")));
    assert_eq!(config.pipeline.rate_limit_per_second, 10);

    let printed = config.to_toml_string().unwrap();
    assert_eq!(LodestarConfig::from_toml_str(&printed).unwrap(), config);
}

#[test]
fn test_discover_rejects_invalid_values() {
    let dir = TempDir::new().unwrap();
    let path = LodestarConfig::config_path(dir.path());
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "[tools]\nbatch_concurrency = 0\n").unwrap();

    assert!(LodestarConfig::discover(dir.path()).is_err());
}

#[test]
fn test_jsonl_log_feeds_stats() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("telemetry.jsonl");
    let sink = JsonlTelemetrySink::open(&path).unwrap();
    let now = Utc::now();

    sink.emit(TelemetryEvent::ToolStart {
        timestamp: now,
        tool_id: "lint".into(),
        speculative: true,
    });
    sink.emit(TelemetryEvent::ToolComplete {
        timestamp: now,
        tool_id: "lint".into(),
        status: "completed".into(),
        duration_ms: 12,
        finding_count: 4,
        files_scanned: 9,
    });
    sink.emit(TelemetryEvent::SpeculativeHit {
        timestamp: now,
        tool_id: "lint".into(),
        saved_ms: 30,
    });
    sink.dispose();
    sink.emit(TelemetryEvent::ToolStart {
        timestamp: now,
        tool_id: "tldr".into(),
        speculative: false,
    });

    let content = std::fs::read_to_string(&path).unwrap();
    let events: Vec<TelemetryEvent> =
        content.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
    assert_eq!(events.len(), 3);

    let stats = TelemetryStats::from_events(&events);
    assert_eq!(stats.runs_started, 1);
    assert_eq!(stats.runs_completed, 1);
    assert_eq!(stats.speculative_hits, 1);
    assert_eq!(stats.saved_ms, 30);
    assert_eq!(stats.hit_rate(), Some(1.0));
}
