//! Integration tests for the orchestrator facade.

use async_trait::async_trait;
use lodestar_core::{LodestarConfig, LogLevel, MemoryTelemetrySink, TelemetryStats};
use lodestar_orchestrator::{
    FindingDraft, MemoryNotifier, Orchestrator, PolicyRejection, RejectionCode, RunContext,
    ScanOptions, ScanStatus, Severity, Tool, ToolError, ToolId, ToolRegistration, ToolRegistry,
    ToolRunner,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Setup {
    orchestrator: Orchestrator,
    telemetry: Arc<MemoryTelemetrySink>,
    notifier: Arc<MemoryNotifier>,
    _dir: tempfile::TempDir,
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn setup(config: LodestarConfig) -> Setup {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "src/lib.rs",
        "// TODO: document\npub fn a() {}\n// FIXME broken edge case\n",
    );
    write(dir.path(), "src/util.rs", "pub fn b() {}\n");
    write(dir.path(), "notes/plan.md", "XXX decide naming\n");

    let telemetry = Arc::new(MemoryTelemetrySink::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let runner = ToolRunner::builder(ToolRegistry::with_builtin_tools())
        .workspace(dir.path().to_path_buf())
        .telemetry(telemetry.clone())
        .notifier(notifier.clone())
        .config(config.clone())
        .build();
    Setup { orchestrator: Orchestrator::new(config, runner), telemetry, notifier, _dir: dir }
}

#[tokio::test]
async fn test_comments_tool_through_pipeline() {
    let setup = setup(LodestarConfig::default());
    let result =
        setup.orchestrator.run_tool(ToolId::Comments, ScanOptions::default()).await.unwrap();

    assert_eq!(result.status, ScanStatus::Completed);
    assert_eq!(result.summary.files_scanned, 3);
    assert_eq!(result.findings.len(), 3);
    assert_eq!(result.summary.warnings, 1);
    assert_eq!(result.summary.infos, 2);
    assert!(
        result
            .findings
            .iter()
            .any(|f| f.severity == Severity::Warning && f.title.starts_with("FIXME"))
    );

    let notes = setup.notifier.notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].message, "comments: 3 findings in 3 files");

    let command_logs = setup.orchestrator.logger().entries_at(LogLevel::Info);
    assert!(
        command_logs.iter().any(|e| e.message.starts_with("Command completed: tools.comments"))
    );
}

#[tokio::test]
async fn test_path_filter_limits_scan() {
    let setup = setup(LodestarConfig::default());
    let options = ScanOptions::default().with_path("notes");
    let result = setup.orchestrator.run_tool(ToolId::Comments, options).await.unwrap();

    assert_eq!(result.summary.files_scanned, 1);
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].location.as_ref().unwrap().path, Path::new("notes/plan.md"));
}

#[tokio::test]
async fn test_denied_command_is_rejected_before_running() {
    let mut config = LodestarConfig::default();
    config.pipeline.denied_commands = vec!["tools.comments".to_string()];
    let setup = setup(config);

    let err =
        setup.orchestrator.run_tool(ToolId::Comments, ScanOptions::default()).await.unwrap_err();
    let rejection = err.downcast_ref::<PolicyRejection>().unwrap();
    assert_eq!(rejection.code, RejectionCode::PermissionDenied);
    assert!(setup.notifier.notifications().is_empty());
    assert!(setup.orchestrator.runner().last_result(ToolId::Comments).await.is_none());
    assert!(setup.telemetry.events_of_kind("tool.start").is_empty());
}

#[tokio::test]
async fn test_rate_limit_applies_per_command() {
    let mut config = LodestarConfig::default();
    config.pipeline.rate_limit_per_second = 1;
    let setup = setup(config);

    setup.orchestrator.run_tool(ToolId::Comments, ScanOptions::default()).await.unwrap();
    let err =
        setup.orchestrator.run_tool(ToolId::Comments, ScanOptions::default()).await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<PolicyRejection>().unwrap().code,
        RejectionCode::RateLimitExceeded
    );
    assert_eq!(setup.orchestrator.logger().entries_at(LogLevel::Warn).len(), 1);
}

#[tokio::test]
async fn test_unknown_tool_surfaces_runner_error() {
    let setup = setup(LodestarConfig::default());
    let err = setup.orchestrator.run_tool(ToolId::Lint, ScanOptions::default()).await.unwrap_err();
    assert_eq!(err.to_string(), "Unknown tool 'lint'");
}

#[tokio::test]
async fn test_speculative_workflow_hits() {
    let setup = setup(LodestarConfig::default());
    let started = setup.orchestrator.begin_workflow(
        "turn-1",
        &[ToolId::Comments, ToolId::Commit],
        &ScanOptions::default(),
    );
    assert_eq!(started, vec![ToolId::Comments]);

    let result =
        setup.orchestrator.run_tool(ToolId::Comments, ScanOptions::default()).await.unwrap();
    assert_eq!(result.status, ScanStatus::Completed);
    assert_eq!(setup.orchestrator.complete_workflow(true).as_deref(), Some("turn-1"));
    assert!(setup.orchestrator.complete_workflow(true).is_none());

    setup.orchestrator.record_finding_acted(&result.findings[0], "dismissed");

    let events = setup.telemetry.events();
    let stats = TelemetryStats::from_events(&events);
    assert_eq!(stats.speculative_hits, 1);
    assert_eq!(stats.speculative_misses, 0);
    assert_eq!(stats.findings_acted, 1);
    assert_eq!(setup.telemetry.events_of_kind("tool.start").len(), 1);
    assert_eq!(setup.telemetry.events_of_kind("workflow.start").len(), 1);
    assert_eq!(setup.telemetry.events_of_kind("workflow.complete").len(), 1);
}

#[tokio::test]
async fn test_speculation_disabled_by_config() {
    let mut config = LodestarConfig::default();
    config.speculative.enabled = false;
    let setup = setup(config);

    let started =
        setup.orchestrator.begin_workflow("turn-1", &[ToolId::Comments], &ScanOptions::default());
    assert!(started.is_empty());
    setup.orchestrator.run_tool(ToolId::Comments, ScanOptions::default()).await.unwrap();
    assert_eq!(setup.orchestrator.complete_workflow(true).as_deref(), Some("turn-1"));

    assert!(setup.telemetry.events_of_kind("speculative.miss").is_empty());
    assert_eq!(setup.telemetry.events_of_kind("tool.start").len(), 1);
    assert_eq!(TelemetryStats::from_events(&setup.telemetry.events()).hit_rate(), None);
}

#[tokio::test]
async fn test_denied_tool_is_not_started_speculatively() {
    let mut config = LodestarConfig::default();
    config.pipeline.denied_commands = vec!["tools.comments".to_string()];
    let setup = setup(config);

    let started =
        setup.orchestrator.begin_workflow("turn-1", &[ToolId::Comments], &ScanOptions::default());
    assert!(started.is_empty());
    assert!(setup.orchestrator.runner().speculator().current().unwrap().is_empty());
    tokio::task::yield_now().await;
    assert!(setup.telemetry.events_of_kind("tool.start").is_empty());

    let err =
        setup.orchestrator.run_tool(ToolId::Comments, ScanOptions::default()).await.unwrap_err();
    assert_eq!(
        err.downcast_ref::<PolicyRejection>().unwrap().code,
        RejectionCode::PermissionDenied
    );
    assert!(setup.telemetry.events_of_kind("tool.start").is_empty());
}

/// Ten steps of 100ms, one finding per step.
struct SlowLint;

#[async_trait]
impl Tool for SlowLint {
    fn id(&self) -> ToolId {
        ToolId::Lint
    }

    async fn analyze(&self, cx: &RunContext, _options: &ScanOptions) -> Result<(), ToolError> {
        for step in 0..10 {
            cx.checkpoint()?;
            tokio::time::sleep(Duration::from_millis(100)).await;
            cx.report_draft(FindingDraft::new(Severity::Info, format!("step {step}")));
        }
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancelling_run_tool_stops_speculative_execution() {
    let mut registry = ToolRegistry::new();
    registry.register(ToolRegistration::new(ToolId::Lint, "slow lint", false, |_| {
        Box::new(SlowLint)
    }));
    let telemetry = Arc::new(MemoryTelemetrySink::new());
    let runner = ToolRunner::builder(registry)
        .workspace(PathBuf::from("/repo"))
        .telemetry(telemetry.clone())
        .build();
    let orchestrator = Orchestrator::new(LodestarConfig::default(), runner);

    let started = orchestrator.begin_workflow("turn-1", &[ToolId::Lint], &ScanOptions::default());
    assert_eq!(started, vec![ToolId::Lint]);

    let token = CancellationToken::new();
    let trigger = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            token.cancel();
        })
    };
    let options = ScanOptions::default().with_cancellation(token);
    let result = orchestrator.run_tool(ToolId::Lint, options).await.unwrap();
    trigger.await.unwrap();

    assert_eq!(result.status, ScanStatus::Cancelled);
    assert_eq!(result.findings.len(), 2);
    assert_eq!(telemetry.events_of_kind("tool.start").len(), 1);
}

#[tokio::test]
async fn test_decomposition_is_recorded() {
    let setup = setup(LodestarConfig::default());
    setup.orchestrator.record_decomposition("turn-7", 3, 45);

    let events = setup.telemetry.events_of_kind("decompose.complete");
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        lodestar_core::TelemetryEvent::DecomposeComplete {
            workflow_id,
            step_count: 3,
            duration_ms: 45,
            ..
        } if workflow_id == "turn-7"
    ));
}
