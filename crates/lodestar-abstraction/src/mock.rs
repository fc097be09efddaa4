//! Scripted provider for tests and offline runs.

use crate::{ChatMessage, ModelError, ModelProvider, ModelReply, ModelRole};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A provider that replays queued replies.
///
/// When the queue is empty it echoes the last user message back. An optional
/// per-request latency makes it useful for timeout and cancellation tests.
#[derive(Debug, Default)]
pub struct MockProvider {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    latency: Option<Duration>,
    requests: AtomicUsize,
}

impl MockProvider {
    /// Creates a mock provider with no queued replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the simulated latency of every request.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queues a successful reply.
    #[must_use]
    pub fn with_reply(self, content: impl Into<String>) -> Self {
        self.push(Ok(content.into()));
        self
    }

    /// Queues a failing reply.
    #[must_use]
    pub fn with_error(self, error: ModelError) -> Self {
        self.push(Err(error));
        self
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn push(&self, reply: Result<String, ModelError>) {
        self.replies.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push_back(reply);
    }

    fn next_reply(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        let queued =
            self.replies.lock().unwrap_or_else(std::sync::PoisonError::into_inner).pop_front();
        queued.unwrap_or_else(|| {
            Ok(messages
                .iter()
                .rev()
                .find(|m| m.role == "user")
                .map(|m| m.content.clone())
                .unwrap_or_default())
        })
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn send_request(
        &self,
        messages: &[ChatMessage],
        role: ModelRole,
        cancellation: CancellationToken,
    ) -> Result<ModelReply, ModelError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::select! {
                () = cancellation.cancelled() => return Err(ModelError::Cancelled),
                () = tokio::time::sleep(latency) => {}
            }
        } else if cancellation.is_cancelled() {
            return Err(ModelError::Cancelled);
        }

        let content = self.next_reply(messages)?;
        Ok(ModelReply {
            content,
            model: format!("mock-{role}"),
            stop_reason: Some("end_turn".to_string()),
        })
    }

    fn provider_id(&self) -> &str {
        "mock"
    }
}
