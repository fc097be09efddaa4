//! Run harness: lifecycle, cooperative cancellation and finding accumulation.

use chrono::Utc;
use futures::FutureExt;
use lodestar_abstraction::ModelProvider;
use lodestar_core::Logger;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ToolError;
use crate::lifecycle::RunState;
use crate::tool::{
    Finding, FindingDraft, Location, ScanOptions, ScanResult, ScanStatus, ScanSummary, Severity,
    Tool, ToolId,
};

/// Limits the harness applies to helpers inside one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Concurrency ceiling for [`RunContext::batch`].
    pub batch_concurrency: usize,
    /// Default deadline for [`RunContext::request_model`].
    pub model_timeout: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self { batch_concurrency: 4, model_timeout: Duration::from_secs(60) }
    }
}

impl From<&lodestar_core::config::ToolsConfig> for RunSettings {
    fn from(config: &lodestar_core::config::ToolsConfig) -> Self {
        Self {
            batch_concurrency: config.batch_concurrency.max(1),
            model_timeout: config.model_timeout(),
        }
    }
}

/// Handle a tool uses to talk to its run.
pub struct RunContext {
    tool_id: ToolId,
    workspace_root: PathBuf,
    token: CancellationToken,
    findings: Mutex<Vec<Finding>>,
    files_scanned: AtomicUsize,
    pub(crate) provider: Option<Arc<dyn ModelProvider>>,
    pub(crate) settings: RunSettings,
    logger: Arc<Logger>,
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunContext")
            .field("tool_id", &self.tool_id)
            .field("cancelled", &self.token.is_cancelled())
            .field("findings", &self.findings_len())
            .finish_non_exhaustive()
    }
}

impl RunContext {
    /// The tool this run belongs to.
    #[must_use]
    pub const fn tool_id(&self) -> ToolId {
        self.tool_id
    }

    /// Root of the workspace being analyzed.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    #[must_use]
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// The run's cancellation signal.
    ///
    /// Fires on [`ToolRun::cancel`] and when the options' external token fires.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.token
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cooperative cancellation checkpoint.
    ///
    /// # Errors
    /// Returns [`ToolError::Cancelled`] once the run's signal has fired.
    pub fn checkpoint(&self) -> Result<(), ToolError> {
        if self.token.is_cancelled() { Err(ToolError::Cancelled) } else { Ok(()) }
    }

    /// Assigns a fresh id and the owning tool to a draft.
    #[must_use]
    pub fn create_finding(&self, draft: FindingDraft) -> Finding {
        Finding {
            id: Uuid::new_v4().to_string(),
            tool_id: self.tool_id,
            title: draft.title,
            description: draft.description,
            location: draft.location,
            severity: draft.severity,
            suggested_fix: draft.suggested_fix,
            metadata: draft.metadata,
        }
    }

    /// Wraps an unexpected failure on one unit of work into a finding.
    #[must_use]
    pub fn create_error_finding(
        &self,
        error: &dyn fmt::Display,
        unit: &str,
        path: Option<&Path>,
    ) -> Finding {
        let mut draft = FindingDraft::new(Severity::Error, format!("Failed to process {unit}"))
            .description(error.to_string())
            .meta("unit", unit);
        if let Some(path) = path {
            draft = draft.at(Location::file(path));
        }
        self.create_finding(draft)
    }

    /// Appends a finding to the run's results.
    pub fn report(&self, finding: Finding) {
        self.lock_findings().push(finding);
    }

    /// Builds and appends a finding in one step.
    pub fn report_draft(&self, draft: FindingDraft) {
        let finding = self.create_finding(draft);
        self.report(finding);
    }

    #[must_use]
    pub fn findings_len(&self) -> usize {
        self.lock_findings().len()
    }

    /// Records that `count` more files were examined.
    pub fn add_files_scanned(&self, count: usize) {
        self.files_scanned.fetch_add(count, Ordering::Relaxed);
    }

    #[must_use]
    pub fn files_scanned(&self) -> usize {
        self.files_scanned.load(Ordering::Relaxed)
    }

    /// The model provider, if one was resolved for this run.
    #[must_use]
    pub fn provider(&self) -> Option<&Arc<dyn ModelProvider>> {
        self.provider.as_ref()
    }

    /// The model provider, failing fast when none is available.
    ///
    /// # Errors
    /// Returns [`ToolError::MissingProvider`].
    pub fn require_provider(&self) -> Result<&Arc<dyn ModelProvider>, ToolError> {
        self.provider.as_ref().ok_or(ToolError::MissingProvider)
    }

    fn lock_findings(&self) -> MutexGuard<'_, Vec<Finding>> {
        self.findings.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn take_findings(&self) -> Vec<Finding> {
        std::mem::take(&mut *self.lock_findings())
    }
}

/// One execution of one tool.
///
/// `execute` may be called once; the run then stays in its terminal state.
pub struct ToolRun {
    tool: Box<dyn Tool>,
    workspace_root: PathBuf,
    provider: Option<Arc<dyn ModelProvider>>,
    logger: Arc<Logger>,
    settings: RunSettings,
    state: Mutex<RunState>,
    token: CancellationToken,
}

impl fmt::Debug for ToolRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRun")
            .field("tool_id", &self.tool.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ToolRun {
    pub fn new(
        tool: Box<dyn Tool>,
        workspace_root: impl Into<PathBuf>,
        provider: Option<Arc<dyn ModelProvider>>,
        logger: Arc<Logger>,
        settings: RunSettings,
    ) -> Self {
        Self {
            tool,
            workspace_root: workspace_root.into(),
            provider,
            logger,
            settings,
            state: Mutex::new(RunState::Pending),
            token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn tool_id(&self) -> ToolId {
        self.tool.id()
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Requests cooperative cancellation.
    ///
    /// In-flight external calls are not aborted; the next checkpoint fails.
    pub fn cancel(&self) {
        debug!(tool_id = %self.tool.id(), "Cancellation requested");
        self.token.cancel();
    }

    fn transition(&self, to: RunState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if state.can_transition_to(to) {
            *state = to;
            true
        } else {
            false
        }
    }

    /// Runs the tool to a terminal state and assembles its result.
    pub async fn execute(&self, options: &ScanOptions) -> ScanResult {
        let tool_id = self.tool.id();
        if !self.transition(RunState::Running) {
            warn!(tool_id = %tool_id, state = %self.state(), "Run already started");
            let error = format!("run already {}", self.state());
            return ScanResult::failed_before_start(tool_id, error);
        }

        let started_at = Utc::now();
        let clock = Instant::now();
        let cx = RunContext {
            tool_id,
            workspace_root: self.workspace_root.clone(),
            token: self.token.clone(),
            findings: Mutex::new(Vec::new()),
            files_scanned: AtomicUsize::new(0),
            provider: self.provider.clone(),
            settings: self.settings,
            logger: Arc::clone(&self.logger),
        };

        let analysis = AssertUnwindSafe(self.tool.analyze(&cx, options)).catch_unwind();
        tokio::pin!(analysis);
        let outcome = match options.cancellation.as_ref() {
            Some(external) => tokio::select! {
                outcome = &mut analysis => outcome,
                () = external.cancelled() => {
                    self.token.cancel();
                    analysis.await
                }
            },
            None => analysis.await,
        };

        let (status, error) = match outcome {
            Ok(Ok(())) => (ScanStatus::Completed, None),
            Ok(Err(ToolError::Cancelled)) => (ScanStatus::Cancelled, None),
            Ok(Err(err)) => (ScanStatus::Failed, Some(err.to_string())),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                (ScanStatus::Failed, Some(format!("tool panicked: {message}")))
            }
        };
        self.transition(status.into());

        let findings = cx.take_findings();
        let summary = ScanSummary::from_findings(&findings, cx.files_scanned());
        ScanResult {
            tool_id,
            status,
            started_at,
            finished_at: Utc::now(),
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
            findings,
            summary,
            error,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
