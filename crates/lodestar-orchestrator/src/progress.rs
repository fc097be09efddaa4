//! Run completion broadcasting and user-facing notifications.
//!
//! Observers (tree views, dashboards) subscribe to [`RunEvent`]s through a
//! broadcast channel. The single human-readable summary per run goes to a
//! [`Notifier`].

use std::fmt;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::tool::{ScanResult, ScanStatus, ToolId};

const EVENT_CAPACITY: usize = 100;

/// Events broadcast by the runner.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A tool run started.
    Started {
        /// Tool ID.
        tool_id: ToolId,
        /// Whether the speculative trigger started it.
        speculative: bool,
    },
    /// A run reached a terminal state and its result was stored.
    Completed {
        /// The stored result.
        result: ScanResult,
    },
}

/// Broadcast sender for run events.
pub struct RunEvents {
    tx: broadcast::Sender<RunEvent>,
}

impl fmt::Debug for RunEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunEvents").field("receivers", &self.tx.receiver_count()).finish()
    }
}

impl Default for RunEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl RunEvents {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }

    pub(crate) fn emit(&self, event: RunEvent) {
        // no receivers is fine
        if self.tx.send(event).is_err() {
            debug!("No run event subscribers");
        }
    }
}

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Error,
}

/// One user-facing summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub tool_id: ToolId,
    pub message: String,
}

impl Notification {
    /// Summarizes a result: finding count, the error, or "cancelled".
    #[must_use]
    pub fn for_result(result: &ScanResult) -> Self {
        let tool_id = result.tool_id;
        match result.status {
            ScanStatus::Completed => {
                let count = result.findings.len();
                let noun = if count == 1 { "finding" } else { "findings" };
                Self {
                    level: NotificationLevel::Info,
                    tool_id,
                    message: format!(
                        "{tool_id}: {count} {noun} in {} files",
                        result.summary.files_scanned
                    ),
                }
            }
            ScanStatus::Cancelled => Self {
                level: NotificationLevel::Info,
                tool_id,
                message: format!("{tool_id}: cancelled"),
            },
            ScanStatus::Failed => {
                let error = result.error.as_deref().unwrap_or("unknown error");
                Self {
                    level: NotificationLevel::Error,
                    tool_id,
                    message: format!("{tool_id} failed: {error}"),
                }
            }
        }
    }
}

/// Receives the user-facing summary of each run.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        let Notification { level, tool_id, message } = notification;
        match level {
            NotificationLevel::Info => info!(tool_id = %tool_id, "{message}"),
            NotificationLevel::Error => error!(tool_id = %tool_id, "{message}"),
        }
    }
}

/// Keeps notifications in memory.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    notifications: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap_or_else(PoisonError::into_inner).push(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_messages() {
        let mut result =
            ScanResult::failed_before_start(ToolId::Lint, "no model provider available");
        let failed = Notification::for_result(&result);
        assert_eq!(failed.level, NotificationLevel::Error);
        assert_eq!(failed.message, "lint failed: no model provider available");

        result.status = ScanStatus::Cancelled;
        assert_eq!(Notification::for_result(&result).message, "lint: cancelled");

        result.status = ScanStatus::Completed;
        result.summary.files_scanned = 4;
        let done = Notification::for_result(&result);
        assert_eq!(done.level, NotificationLevel::Info);
        assert_eq!(done.message, "lint: 0 findings in 4 files");
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let events = RunEvents::new();
        let mut rx = events.subscribe();
        events.emit(RunEvent::Started { tool_id: ToolId::Tldr, speculative: true });
        assert!(matches!(
            rx.recv().await.unwrap(),
            RunEvent::Started { tool_id: ToolId::Tldr, speculative: true }
        ));
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        RunEvents::new().emit(RunEvent::Started { tool_id: ToolId::Lint, speculative: false });
    }
}
