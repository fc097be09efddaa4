//! Tool runner: resolves dependencies, executes tools and stores results.

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use lodestar_abstraction::ModelProvider;
use lodestar_core::config::RunnerConfig;
use lodestar_core::{
    GitCli, LodestarConfig, Logger, NoopTelemetrySink, RepositoryAccess, TelemetryEvent,
    TelemetrySink,
};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RunnerError;
use crate::progress::{Notification, Notifier, RunEvent, RunEvents, TracingNotifier};
use crate::registry::{ToolDeps, ToolRegistry};
use crate::run::{RunSettings, ToolRun};
use crate::speculative::{SpeculativeCache, Speculator};
use crate::tool::{ScanOptions, ScanResult, ScanStatus, ToolId};

/// Message of the `failed` result for a model tool without a provider.
pub const NO_PROVIDER_MESSAGE: &str = "no model provider available";

/// Supplies the workspace root, if one is open.
pub trait WorkspaceRootProvider: Send + Sync {
    fn workspace_root(&self) -> Option<PathBuf>;
}

impl WorkspaceRootProvider for PathBuf {
    fn workspace_root(&self) -> Option<PathBuf> {
        Some(self.clone())
    }
}

impl WorkspaceRootProvider for Option<PathBuf> {
    fn workspace_root(&self) -> Option<PathBuf> {
        self.clone()
    }
}

/// Supplies the currently active model provider.
///
/// A provider may become available later (e.g. after sign-in), so the
/// runner polls this a bounded number of times for tools that need one.
#[async_trait]
pub trait ProviderSource: Send + Sync {
    async fn active_provider(&self) -> Option<Arc<dyn ModelProvider>>;
}

/// A provider source that always returns the same answer.
#[derive(Clone, Default)]
pub struct FixedProvider(pub Option<Arc<dyn ModelProvider>>);

#[async_trait]
impl ProviderSource for FixedProvider {
    async fn active_provider(&self) -> Option<Arc<dyn ModelProvider>> {
        self.0.clone()
    }
}

/// Opens repository access for a workspace root.
pub type RepositoryFactory = Arc<dyn Fn(&Path) -> Arc<dyn RepositoryAccess> + Send + Sync>;

/// Runs tools, keeping the latest result per tool.
pub struct ToolRunner {
    registry: Arc<ToolRegistry>,
    workspace: Arc<dyn WorkspaceRootProvider>,
    providers: Arc<dyn ProviderSource>,
    repositories: RepositoryFactory,
    logger: Arc<Logger>,
    telemetry: Arc<dyn TelemetrySink>,
    notifier: Arc<dyn Notifier>,
    retry: RunnerConfig,
    settings: RunSettings,
    speculator: Speculator,
    events: RunEvents,
    last_results: RwLock<HashMap<ToolId, ScanResult>>,
    active: Mutex<HashMap<ToolId, Arc<ToolRun>>>,
}

impl fmt::Debug for ToolRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRunner")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .field("speculator", &self.speculator)
            .finish_non_exhaustive()
    }
}

impl ToolRunner {
    #[must_use]
    pub fn builder(registry: ToolRegistry) -> ToolRunnerBuilder {
        ToolRunnerBuilder::new(registry)
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    #[must_use]
    pub fn speculator(&self) -> &Speculator {
        &self.speculator
    }

    #[must_use]
    pub fn logger(&self) -> &Arc<Logger> {
        &self.logger
    }

    #[must_use]
    pub fn telemetry(&self) -> &Arc<dyn TelemetrySink> {
        &self.telemetry
    }

    /// Subscribes to run events.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// The most recent result for `tool_id`.
    pub async fn last_result(&self, tool_id: ToolId) -> Option<ScanResult> {
        self.last_results.read().await.get(&tool_id).cloned()
    }

    /// Requests cancellation of the in-flight run of `tool_id`.
    ///
    /// Returns `false` when the tool is not running.
    pub fn cancel(&self, tool_id: ToolId) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.get(&tool_id).is_some_and(|run| {
            run.cancel();
            true
        })
    }

    /// Runs a tool, reusing this turn's speculative execution when present.
    ///
    /// The result is stored, broadcast and summarized to the notifier
    /// whatever its status.
    ///
    /// # Errors
    /// [`RunnerError`] when the tool is unknown or no workspace is open; no
    /// result is produced then.
    pub async fn run(
        &self,
        tool_id: ToolId,
        options: ScanOptions,
    ) -> Result<ScanResult, RunnerError> {
        if !self.registry.contains(tool_id) {
            return Err(RunnerError::UnknownTool(tool_id));
        }

        let cache = self.speculator.current().filter(|_| self.speculator.is_enabled());
        let speculative = match cache {
            Some(cache) => {
                self.resolve_speculative(&cache, tool_id, options.cancellation.as_ref()).await
            }
            None => None,
        };
        let result = match speculative {
            Some(result) => result,
            None => self.execute_tool(tool_id, &options, false).await?,
        };

        self.finish(&result).await;
        Ok(result)
    }

    /// Awaits this turn's speculative run of `tool_id` on behalf of a
    /// consumer holding `token`.
    ///
    /// Cancelling `token` cancels the speculative run, which then ends at its
    /// next checkpoint with the findings it already has.
    async fn resolve_speculative(
        &self,
        cache: &SpeculativeCache,
        tool_id: ToolId,
        token: Option<&CancellationToken>,
    ) -> Option<ScanResult> {
        let Some(token) = token else {
            return cache.resolve(tool_id).await;
        };
        let resolve = cache.resolve(tool_id);
        tokio::pin!(resolve);
        tokio::select! {
            result = &mut resolve => result,
            () = token.cancelled() => {
                if self.cancel(tool_id) {
                    debug!(tool_id = %tool_id, "Cancelled speculative run on consumer request");
                    return resolve.await;
                }
                // Not started yet or already settled.
                match resolve.as_mut().now_or_never() {
                    Some(result) => result,
                    None => Some(ScanResult::cancelled_before_start(tool_id)),
                }
            }
        }
    }

    /// Constructs and executes a tool without storing or announcing the result.
    ///
    /// # Errors
    /// See [`ToolRunner::run`].
    pub async fn execute_tool(
        &self,
        tool_id: ToolId,
        options: &ScanOptions,
        speculative: bool,
    ) -> Result<ScanResult, RunnerError> {
        let registration = self.registry.get(tool_id).ok_or(RunnerError::UnknownTool(tool_id))?;
        let workspace_root = self.workspace.workspace_root().ok_or(RunnerError::NoWorkspace)?;

        let provider = if registration.requires_model {
            self.resolve_provider(tool_id).await
        } else {
            self.providers.active_provider().await
        };
        if registration.requires_model && provider.is_none() {
            warn!(tool_id = %tool_id, "Refusing to run: {NO_PROVIDER_MESSAGE}");
            let result = ScanResult::failed_before_start(tool_id, NO_PROVIDER_MESSAGE);
            self.record_outcome(&result);
            return Ok(result);
        }

        let deps = ToolDeps {
            repository: (self.repositories)(&workspace_root),
            workspace_root,
            provider,
            logger: Arc::clone(&self.logger),
            settings: self.settings,
        };
        let run = Arc::new(ToolRun::new(
            registration.build(&deps),
            deps.workspace_root.clone(),
            deps.provider.clone(),
            Arc::clone(&self.logger),
            self.settings,
        ));

        info!(tool_id = %tool_id, speculative, "Starting tool run");
        self.telemetry.emit(TelemetryEvent::ToolStart {
            timestamp: Utc::now(),
            tool_id: tool_id.to_string(),
            speculative,
        });
        self.events.emit(RunEvent::Started { tool_id, speculative });

        self.track(tool_id, &run);
        let result = run.execute(options).await;
        self.untrack(tool_id, &run);

        self.record_outcome(&result);
        Ok(result)
    }

    async fn resolve_provider(&self, tool_id: ToolId) -> Option<Arc<dyn ModelProvider>> {
        let attempts = self.retry.provider_retry_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(provider) = self.providers.active_provider().await {
                return Some(provider);
            }
            if attempt < attempts {
                debug!(
                    tool_id = %tool_id,
                    attempt,
                    attempts,
                    "Model provider not available yet, retrying"
                );
                tokio::time::sleep(self.retry.provider_retry_delay()).await;
            }
        }
        None
    }

    fn track(&self, tool_id: ToolId, run: &Arc<ToolRun>) {
        self.active.lock().unwrap_or_else(PoisonError::into_inner).insert(tool_id, Arc::clone(run));
    }

    fn untrack(&self, tool_id: ToolId, run: &Arc<ToolRun>) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.get(&tool_id).is_some_and(|current| Arc::ptr_eq(current, run)) {
            active.remove(&tool_id);
        }
    }

    fn record_outcome(&self, result: &ScanResult) {
        let tool_id = result.tool_id.to_string();
        match result.status {
            ScanStatus::Completed | ScanStatus::Cancelled => {
                debug!(
                    tool_id = %tool_id,
                    status = %result.status,
                    duration_ms = result.duration_ms,
                    "Tool run finished"
                );
                self.telemetry.emit(TelemetryEvent::ToolComplete {
                    timestamp: Utc::now(),
                    tool_id,
                    status: result.status.to_string(),
                    duration_ms: result.duration_ms,
                    finding_count: result.findings.len(),
                    files_scanned: result.summary.files_scanned,
                });
            }
            ScanStatus::Failed => {
                let error = result.error.clone().unwrap_or_default();
                warn!(tool_id = %tool_id, error = %error, "Tool run failed");
                self.telemetry.emit(TelemetryEvent::ToolError {
                    timestamp: Utc::now(),
                    tool_id,
                    error,
                    duration_ms: result.duration_ms,
                });
            }
        }
    }

    async fn finish(&self, result: &ScanResult) {
        self.last_results.write().await.insert(result.tool_id, result.clone());
        self.events.emit(RunEvent::Completed { result: result.clone() });
        self.notifier.notify(Notification::for_result(result));
    }
}

/// Builder for [`ToolRunner`].
pub struct ToolRunnerBuilder {
    registry: ToolRegistry,
    workspace: Arc<dyn WorkspaceRootProvider>,
    providers: Arc<dyn ProviderSource>,
    repositories: Option<RepositoryFactory>,
    logger: Option<Arc<Logger>>,
    telemetry: Arc<dyn TelemetrySink>,
    notifier: Arc<dyn Notifier>,
    config: LodestarConfig,
}

impl ToolRunnerBuilder {
    fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            workspace: Arc::new(None::<PathBuf>),
            providers: Arc::new(FixedProvider::default()),
            repositories: None,
            logger: None,
            telemetry: Arc::new(NoopTelemetrySink),
            notifier: Arc::new(TracingNotifier),
            config: LodestarConfig::default(),
        }
    }

    #[must_use]
    pub fn workspace(mut self, workspace: impl WorkspaceRootProvider + 'static) -> Self {
        self.workspace = Arc::new(workspace);
        self
    }

    #[must_use]
    pub fn workspace_provider(mut self, workspace: Arc<dyn WorkspaceRootProvider>) -> Self {
        self.workspace = workspace;
        self
    }

    /// Uses a fixed model provider.
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.providers = Arc::new(FixedProvider(Some(provider)));
        self
    }

    #[must_use]
    pub fn provider_source(mut self, providers: Arc<dyn ProviderSource>) -> Self {
        self.providers = providers;
        self
    }

    /// Uses the same repository access for every workspace.
    #[must_use]
    pub fn repository(mut self, repository: Arc<dyn RepositoryAccess>) -> Self {
        self.repositories = Some(Arc::new(move |_: &Path| Arc::clone(&repository)));
        self
    }

    #[must_use]
    pub fn repository_factory(mut self, factory: RepositoryFactory) -> Self {
        self.repositories = Some(factory);
        self
    }

    #[must_use]
    pub fn logger(mut self, logger: Arc<Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    #[must_use]
    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Applies runner, tool, logging and speculation settings.
    #[must_use]
    pub fn config(mut self, config: LodestarConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<ToolRunner> {
        let capacity = self.config.logging.capacity;
        let logger = self.logger.unwrap_or_else(|| Arc::new(Logger::new(capacity)));
        let repositories = self.repositories.unwrap_or_else(|| {
            Arc::new(|root: &Path| Arc::new(GitCli::new(root)) as Arc<dyn RepositoryAccess>)
        });
        let speculator =
            Speculator::new(self.config.speculative.enabled, Arc::clone(&self.telemetry));
        Arc::new(ToolRunner {
            registry: Arc::new(self.registry),
            workspace: self.workspace,
            providers: self.providers,
            repositories,
            logger,
            speculator,
            telemetry: self.telemetry,
            notifier: self.notifier,
            retry: self.config.runner.clone(),
            settings: RunSettings::from(&self.config.tools),
            events: RunEvents::new(),
            last_results: RwLock::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
        })
    }
}
