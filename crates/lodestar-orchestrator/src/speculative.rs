//! Speculative pre-execution.
//!
//! When intent is recognized, eligible read-only tools are started at once
//! and their shared futures registered in a [`SpeculativeCache`] scoped to
//! that turn. A consumer that later needs the tool awaits the registered
//! future instead of starting a second execution.
//!
//! There is no eviction: a new turn replaces the whole cache. Futures of the
//! old turn are abandoned, not cancelled, and are freed once they settle.

use chrono::Utc;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use lodestar_core::{TelemetryEvent, TelemetrySink};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::debug;

use crate::error::RunnerError;
use crate::runner::ToolRunner;
use crate::tool::{ScanOptions, ScanResult, ToolId};

/// A single-assignment, awaitable tool execution.
pub type SharedRun = Shared<BoxFuture<'static, Result<ScanResult, RunnerError>>>;

/// Why a registration was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpeculationError {
    #[error("Tool '{0}' mutates the repository and cannot run speculatively")]
    NotEligible(ToolId),

    #[error("Tool '{0}' is already registered for this turn")]
    AlreadyRegistered(ToolId),
}

struct Entry {
    run: SharedRun,
    registered_at: Instant,
}

/// Tool id to in-flight or settled execution, for one turn.
pub struct SpeculativeCache {
    turn_id: String,
    started_at: Instant,
    entries: Mutex<HashMap<ToolId, Entry>>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl fmt::Debug for SpeculativeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeculativeCache")
            .field("turn_id", &self.turn_id)
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl SpeculativeCache {
    pub fn new(turn_id: impl Into<String>, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            turn_id: turn_id.into(),
            started_at: Instant::now(),
            entries: Mutex::new(HashMap::new()),
            telemetry,
        }
    }

    #[must_use]
    pub fn turn_id(&self) -> &str {
        &self.turn_id
    }

    /// When the turn began.
    #[must_use]
    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Inserts `run` under `tool_id` if absent. The first insertion wins.
    ///
    /// # Errors
    /// [`SpeculationError::NotEligible`] for mutating tools,
    /// [`SpeculationError::AlreadyRegistered`] when an entry exists.
    pub fn register_speculative(
        &self,
        tool_id: ToolId,
        run: SharedRun,
    ) -> Result<(), SpeculationError> {
        if !tool_id.is_read_only() {
            return Err(SpeculationError::NotEligible(tool_id));
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&tool_id) {
            return Err(SpeculationError::AlreadyRegistered(tool_id));
        }
        entries.insert(tool_id, Entry { run, registered_at: Instant::now() });
        Ok(())
    }

    /// Returns the registered execution for `tool_id`, if any.
    #[must_use]
    pub fn try_speculative(&self, tool_id: ToolId) -> Option<SharedRun> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(&tool_id).map(|entry| entry.run.clone())
    }

    /// Awaits the registered execution and records a hit or a miss.
    ///
    /// Returns `None` when there is no entry or the speculative run failed;
    /// the caller then runs the tool fresh.
    pub async fn resolve(&self, tool_id: ToolId) -> Option<ScanResult> {
        let found = {
            let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.get(&tool_id).map(|entry| (entry.run.clone(), entry.registered_at))
        };
        let Some((run, registered_at)) = found else {
            self.miss(tool_id, "not_registered");
            return None;
        };

        let saved_ms = u64::try_from(registered_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        match run.await {
            Ok(result) if !result.is_failed() => {
                debug!(tool_id = %tool_id, turn_id = %self.turn_id, saved_ms, "Speculative hit");
                self.telemetry.emit(TelemetryEvent::SpeculativeHit {
                    timestamp: Utc::now(),
                    tool_id: tool_id.to_string(),
                    saved_ms,
                });
                Some(result)
            }
            Ok(_) => {
                self.miss(tool_id, "speculative_failed");
                None
            }
            Err(err) => {
                self.miss(tool_id, &err.to_string());
                None
            }
        }
    }

    fn miss(&self, tool_id: ToolId, reason: &str) {
        debug!(tool_id = %tool_id, turn_id = %self.turn_id, reason, "Speculative miss");
        self.telemetry.emit(TelemetryEvent::SpeculativeMiss {
            timestamp: Utc::now(),
            tool_id: tool_id.to_string(),
            reason: reason.to_string(),
        });
    }

    #[must_use]
    pub fn contains(&self, tool_id: ToolId) -> bool {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).contains_key(&tool_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owns the cache of the current turn.
pub struct Speculator {
    enabled: bool,
    telemetry: Arc<dyn TelemetrySink>,
    current: RwLock<Option<Arc<SpeculativeCache>>>,
}

impl fmt::Debug for Speculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Speculator")
            .field("enabled", &self.enabled)
            .field("current", &self.current())
            .finish_non_exhaustive()
    }
}

impl Speculator {
    #[must_use]
    pub fn new(enabled: bool, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self { enabled, telemetry, current: RwLock::new(None) }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Starts a new turn with an empty cache, discarding the previous one.
    pub fn begin_turn(&self, turn_id: impl Into<String>) -> Arc<SpeculativeCache> {
        let cache = Arc::new(SpeculativeCache::new(turn_id, Arc::clone(&self.telemetry)));
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let previous = current.replace(Arc::clone(&cache));
        drop(current);
        if let Some(previous) = previous {
            debug!(
                turn_id = %previous.turn_id(),
                abandoned = previous.len(),
                "Discarding speculative cache"
            );
        }
        cache
    }

    /// Ends the current turn, if any, and returns its cache.
    pub fn end_turn(&self) -> Option<Arc<SpeculativeCache>> {
        self.current.write().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// The cache of the current turn.
    #[must_use]
    pub fn current(&self) -> Option<Arc<SpeculativeCache>> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Starts each eligible tool in a background task and registers it in
    /// the current turn's cache. Returns the tools that were started.
    ///
    /// Mutating, unregistered and already registered tools are skipped. No
    /// permission check happens here; [`crate::Orchestrator::begin_workflow`]
    /// filters denied commands before calling this. Outside a tokio runtime
    /// nothing is started.
    pub fn speculate(
        &self,
        runner: &Arc<ToolRunner>,
        tool_ids: &[ToolId],
        options: &ScanOptions,
    ) -> Vec<ToolId> {
        if !self.enabled {
            return Vec::new();
        }
        let Some(cache) = self.current() else {
            debug!("No active turn; speculation skipped");
            return Vec::new();
        };
        let Ok(handle) = Handle::try_current() else {
            debug!(turn_id = %cache.turn_id(), "No tokio runtime; speculation skipped");
            return Vec::new();
        };

        let mut started = Vec::new();
        for &tool_id in tool_ids {
            if !tool_id.is_read_only()
                || !runner.registry().contains(tool_id)
                || cache.contains(tool_id)
            {
                debug!(tool_id = %tool_id, "Tool not eligible for speculation");
                continue;
            }
            let task_runner = Arc::clone(runner);
            let task_options = options.clone();
            let run = async move { task_runner.execute_tool(tool_id, &task_options, true).await }
                .boxed()
                .shared();
            match cache.register_speculative(tool_id, run.clone()) {
                Ok(()) => {
                    handle.spawn(run);
                    started.push(tool_id);
                }
                Err(err) => {
                    debug!(tool_id = %tool_id, error = %err, "Speculative registration refused");
                }
            }
        }
        started
    }
}
