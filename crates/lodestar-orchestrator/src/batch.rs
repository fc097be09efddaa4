//! Bounded concurrent batch helper.

use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::{Path, PathBuf};

use crate::error::ToolError;
use crate::run::RunContext;
use crate::tool::Finding;

/// Something a batch can name in its error findings.
pub trait BatchItem {
    /// Label used in the error finding's title.
    fn unit_label(&self) -> String;

    /// File the unit refers to, if any.
    fn unit_path(&self) -> Option<&Path> {
        None
    }
}

impl BatchItem for PathBuf {
    fn unit_label(&self) -> String {
        self.display().to_string()
    }

    fn unit_path(&self) -> Option<&Path> {
        Some(self)
    }
}

impl BatchItem for String {
    fn unit_label(&self) -> String {
        self.clone()
    }
}

impl BatchItem for &str {
    fn unit_label(&self) -> String {
        (*self).to_string()
    }
}

/// Outcome for one item of a batch. `slots[i]` always belongs to `items[i]`.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchSlot<R> {
    /// The operation succeeded.
    Done(R),
    /// The operation failed; the finding was also reported to the run.
    Failed(Finding),
    /// The run was cancelled before the item was dispatched.
    Skipped,
}

impl<R> BatchSlot<R> {
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    #[must_use]
    pub fn into_done(self) -> Option<R> {
        match self {
            Self::Done(value) => Some(value),
            Self::Failed(_) | Self::Skipped => None,
        }
    }
}

impl RunContext {
    /// Runs `op` over `items` with at most `batch_concurrency` in flight.
    ///
    /// Failures become error findings in their own slot. After cancellation
    /// no new item is dispatched; items already in flight finish normally.
    pub async fn batch<T, R, F, Fut>(&self, items: Vec<T>, op: F) -> Vec<BatchSlot<R>>
    where
        T: BatchItem + Send,
        R: Send,
        F: Fn(T) -> Fut + Send + Sync,
        Fut: Future<Output = Result<R, ToolError>> + Send,
    {
        let concurrency = self.settings.batch_concurrency.max(1);
        let op = &op;
        stream::iter(items)
            .map(|item| async move {
                if self.is_cancelled() {
                    return BatchSlot::Skipped;
                }
                let label = item.unit_label();
                let path = item.unit_path().map(Path::to_path_buf);
                match op(item).await {
                    Ok(value) => BatchSlot::Done(value),
                    Err(ToolError::Cancelled) => BatchSlot::Skipped,
                    Err(err) => {
                        tracing::debug!(
                            tool_id = %self.tool_id(),
                            unit = %label,
                            error = %err,
                            "Batch item failed"
                        );
                        let finding = self.create_error_finding(&err, &label, path.as_deref());
                        self.report(finding.clone());
                        BatchSlot::Failed(finding)
                    }
                }
            })
            .buffered(concurrency)
            .collect()
            .await
    }
}
