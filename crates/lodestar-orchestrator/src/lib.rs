//! Tool execution orchestration for Lodestar.
//!
//! This crate runs analysis tools against a local repository:
//! - [`tool`]: the tool contract and the findings/results it produces
//! - [`run`]: the run harness with cooperative cancellation, plus the batch
//!   and model-call helpers on [`RunContext`]
//! - [`pipeline`]: middleware applied to every command
//! - [`registry`] and [`runner`]: construction, execution and result storage
//! - [`speculative`]: per-turn speculative pre-execution
//!
//! [`Orchestrator`] ties them together.

pub mod batch;
pub mod error;
pub mod lifecycle;
mod model_call;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod run;
pub mod runner;
pub mod speculative;
pub mod tool;
pub mod tools;

use chrono::Utc;
use lodestar_core::{LodestarConfig, Logger, TelemetryEvent};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

pub use batch::{BatchItem, BatchSlot};
pub use error::{PolicyRejection, RejectionCode, RunnerError, ToolError};
pub use lifecycle::RunState;
pub use pipeline::{CommandContext, DenyList, Middleware, Next, PermissionCheck, Pipeline};
pub use progress::{
    MemoryNotifier, Notification, NotificationLevel, Notifier, RunEvent, TracingNotifier,
};
pub use registry::{ToolDeps, ToolRegistration, ToolRegistry};
pub use run::{RunContext, RunSettings, ToolRun};
pub use runner::{
    FixedProvider, ProviderSource, ToolRunner, ToolRunnerBuilder, WorkspaceRootProvider,
};
pub use speculative::{SharedRun, SpeculationError, SpeculativeCache, Speculator};
pub use tool::{
    Finding, FindingDraft, Location, ScanOptions, ScanResult, ScanStatus, ScanSummary, Severity,
    SuggestedFix, Tool, ToolId,
};

/// Pipeline, runner and speculation behind one entry point.
pub struct Orchestrator {
    config: LodestarConfig,
    pipeline: Pipeline,
    permission: Arc<dyn PermissionCheck>,
    runner: Arc<ToolRunner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("pipeline", &self.pipeline)
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Uses the standard pipeline with the configured deny list.
    #[must_use]
    pub fn new(config: LodestarConfig, runner: Arc<ToolRunner>) -> Self {
        let permission = Arc::new(DenyList::new(config.pipeline.denied_commands.iter().cloned()));
        Self::with_permission(config, runner, permission)
    }

    /// Uses the standard pipeline with a custom permission predicate.
    #[must_use]
    pub fn with_permission(
        config: LodestarConfig,
        runner: Arc<ToolRunner>,
        permission: Arc<dyn PermissionCheck>,
    ) -> Self {
        let logger = Arc::clone(runner.logger());
        let pipeline = Pipeline::standard(&config.pipeline, logger, Arc::clone(&permission));
        Self { config, pipeline, permission, runner }
    }

    #[must_use]
    pub const fn config(&self) -> &LodestarConfig {
        &self.config
    }

    #[must_use]
    pub const fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    #[must_use]
    pub const fn runner(&self) -> &Arc<ToolRunner> {
        &self.runner
    }

    #[must_use]
    pub fn logger(&self) -> &Logger {
        self.runner.logger()
    }

    /// Applies the middleware chain to `handler` under `command`.
    ///
    /// # Errors
    /// The handler's error or a [`PolicyRejection`].
    pub async fn run_via_pipeline<T, F, Fut>(
        &self,
        command: &str,
        args: Value,
        handler: F,
    ) -> anyhow::Result<T>
    where
        T: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = anyhow::Result<T>> + Send,
    {
        let cx = CommandContext::new(command).with_args(args);
        self.pipeline.run(&cx, handler).await
    }

    /// Runs a tool through the pipeline under its command name.
    ///
    /// # Errors
    /// A [`PolicyRejection`] or a [`RunnerError`], inside the `anyhow::Error`.
    pub async fn run_tool(
        &self,
        tool_id: ToolId,
        options: ScanOptions,
    ) -> anyhow::Result<ScanResult> {
        let args = Value::Object(options.args.clone());
        let runner = Arc::clone(&self.runner);
        self.run_via_pipeline(tool_id.command_name(), args, move || async move {
            Ok(runner.run(tool_id, options).await?)
        })
        .await
    }

    /// Requests cancellation of the in-flight run of `tool_id`.
    pub fn cancel(&self, tool_id: ToolId) -> bool {
        self.runner.cancel(tool_id)
    }

    /// Starts a new turn and speculatively starts the eligible tools.
    ///
    /// Tools whose command the permission check denies are never started.
    /// Returns the tools that were started.
    pub fn begin_workflow(
        &self,
        workflow_id: &str,
        tool_ids: &[ToolId],
        options: &ScanOptions,
    ) -> Vec<ToolId> {
        info!(workflow_id, tools = tool_ids.len(), "Workflow started");
        self.runner.telemetry().emit(TelemetryEvent::WorkflowStart {
            timestamp: Utc::now(),
            workflow_id: workflow_id.to_string(),
            tool_count: tool_ids.len(),
        });
        let speculator = self.runner.speculator();
        speculator.begin_turn(workflow_id);
        let permitted: Vec<ToolId> = tool_ids
            .iter()
            .copied()
            .filter(|tool_id| {
                let allowed = self.permission.is_allowed(tool_id.command_name());
                if !allowed {
                    debug!(tool_id = %tool_id, "Denied command not started speculatively");
                }
                allowed
            })
            .collect();
        speculator.speculate(&self.runner, &permitted, options)
    }

    /// Ends the current turn. Returns its id, or `None` without an active turn.
    pub fn complete_workflow(&self, success: bool) -> Option<String> {
        let cache = self.runner.speculator().end_turn()?;
        let elapsed = cache.started_at().elapsed();
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        info!(workflow_id = %cache.turn_id(), duration_ms, success, "Workflow completed");
        self.runner.telemetry().emit(TelemetryEvent::WorkflowComplete {
            timestamp: Utc::now(),
            workflow_id: cache.turn_id().to_string(),
            duration_ms,
            success,
        });
        Some(cache.turn_id().to_string())
    }

    /// Records how a request was decomposed into tool steps.
    pub fn record_decomposition(&self, workflow_id: &str, step_count: usize, duration_ms: u64) {
        self.runner.telemetry().emit(TelemetryEvent::DecomposeComplete {
            timestamp: Utc::now(),
            workflow_id: workflow_id.to_string(),
            step_count,
            duration_ms,
        });
    }

    /// Records that the user acted on a finding (applied, dismissed, ...).
    pub fn record_finding_acted(&self, finding: &Finding, action: &str) {
        self.runner.telemetry().emit(TelemetryEvent::FindingActed {
            timestamp: Utc::now(),
            tool_id: finding.tool_id.to_string(),
            finding_id: finding.id.clone(),
            action: action.to_string(),
        });
    }
}
