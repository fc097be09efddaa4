//! Cancellation keeps a prefix of what a full run reports.

use async_trait::async_trait;
use lodestar_orchestrator::{
    BatchSlot, FindingDraft, Location, RunContext, ScanOptions, ScanStatus, Severity, Tool,
    ToolError, ToolId, ToolRegistration, ToolRegistry, ToolRunner,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Visits twenty "files" in batches of four, one finding per file.
struct SlowScan;

#[async_trait]
impl Tool for SlowScan {
    fn id(&self) -> ToolId {
        ToolId::DeadCode
    }

    async fn analyze(&self, cx: &RunContext, _options: &ScanOptions) -> Result<(), ToolError> {
        let files: Vec<PathBuf> =
            (0..20).map(|i| PathBuf::from(format!("src/f{i:02}.rs"))).collect();
        for chunk in files.chunks(4) {
            cx.checkpoint()?;
            let slots = cx
                .batch(chunk.to_vec(), |path| async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(path)
                })
                .await;
            for path in slots.into_iter().filter_map(BatchSlot::into_done) {
                cx.add_files_scanned(1);
                let draft = FindingDraft::new(Severity::Hint, "unused item");
                cx.report_draft(draft.at(Location::line(path, 1)));
            }
        }
        Ok(())
    }
}

fn runner() -> Arc<ToolRunner> {
    let mut registry = ToolRegistry::new();
    registry.register(ToolRegistration::new(ToolId::DeadCode, "slow scan", false, |_| {
        Box::new(SlowScan)
    }));
    ToolRunner::builder(registry).workspace(PathBuf::from("/repo")).build()
}

fn paths(findings: &[lodestar_orchestrator::Finding]) -> Vec<PathBuf> {
    findings.iter().filter_map(|f| f.location.as_ref().map(|l| l.path.clone())).collect()
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_findings_are_prefix_of_full_run() {
    let runner = runner();
    let full = runner.run(ToolId::DeadCode, ScanOptions::default()).await.unwrap();
    assert_eq!(full.status, ScanStatus::Completed);
    assert_eq!(full.findings.len(), 20);

    let token = CancellationToken::new();
    let trigger = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            token.cancel();
        })
    };
    let options = ScanOptions::default().with_cancellation(token);
    let partial = runner.run(ToolId::DeadCode, options).await.unwrap();
    trigger.await.unwrap();

    assert_eq!(partial.status, ScanStatus::Cancelled);
    assert!(partial.error.is_none());
    let partial_paths = paths(&partial.findings);
    let full_paths = paths(&full.findings);
    assert!(!partial_paths.is_empty());
    assert!(partial_paths.len() < full_paths.len());
    assert_eq!(partial_paths[..], full_paths[..partial_paths.len()]);
    assert_eq!(partial.summary.files_scanned, partial_paths.len());
    assert_eq!(runner.last_result(ToolId::DeadCode).await.unwrap().status, ScanStatus::Cancelled);
}
