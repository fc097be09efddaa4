//! Deadline-bounded model requests.

use lodestar_abstraction::{ChatMessage, ModelError, ModelReply, ModelRole};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ToolError;
use crate::run::RunContext;

impl RunContext {
    /// Sends a model request bounded by the run's default model timeout.
    ///
    /// # Errors
    /// See [`RunContext::request_model_with_timeout`].
    pub async fn request_model(
        &self,
        messages: &[ChatMessage],
        role: ModelRole,
        cancellation: Option<&CancellationToken>,
    ) -> Result<ModelReply, ToolError> {
        let timeout = self.settings.model_timeout;
        self.request_model_with_timeout(messages, role, timeout, cancellation).await
    }

    /// Sends a model request that aborts on whichever fires first: the
    /// deadline or the caller's token. The request is not retried.
    ///
    /// Pass [`RunContext::cancellation`] to tie the call to the run, or
    /// `None` to let an already dispatched call finish on its own deadline.
    ///
    /// # Errors
    /// [`ToolError::MissingProvider`] without a provider,
    /// [`ToolError::Cancelled`] when the caller cancelled,
    /// [`ToolError::Model`] with [`ModelError::Timeout`] on deadline, or the
    /// provider's own error.
    pub async fn request_model_with_timeout(
        &self,
        messages: &[ChatMessage],
        role: ModelRole,
        timeout: Duration,
        cancellation: Option<&CancellationToken>,
    ) -> Result<ModelReply, ToolError> {
        let provider = self.require_provider()?;
        let call_token =
            cancellation.map_or_else(CancellationToken::new, CancellationToken::child_token);
        let caller_cancelled = async {
            match cancellation {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = caller_cancelled => {
                call_token.cancel();
                Err(ToolError::Cancelled)
            }
            () = tokio::time::sleep(timeout) => {
                call_token.cancel();
                let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                debug!(
                    tool_id = %self.tool_id(),
                    provider = provider.provider_id(),
                    timeout_ms = ms,
                    "Model request timed out"
                );
                Err(ToolError::Model(ModelError::Timeout(ms)))
            }
            reply = provider.send_request(messages, role, call_token.clone()) => {
                reply.map_err(ToolError::from)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{RunSettings, ToolRun};
    use crate::tool::{FindingDraft, ScanOptions, ScanStatus, Severity, Tool, ToolId};
    use async_trait::async_trait;
    use lodestar_abstraction::{MockProvider, ModelProvider};
    use lodestar_core::Logger;
    use std::sync::{Arc, Mutex};

    struct AskTool {
        timeout: Duration,
        use_run_token: bool,
        outcome: Arc<Mutex<Option<String>>>,
    }

    #[async_trait]
    impl Tool for AskTool {
        fn id(&self) -> ToolId {
            ToolId::Tldr
        }

        async fn analyze(&self, cx: &RunContext, _options: &ScanOptions) -> Result<(), ToolError> {
            let token = self.use_run_token.then(|| cx.cancellation().clone());
            let messages = [ChatMessage::user("summarize")];
            let (role, timeout) = (ModelRole::Fast, self.timeout);
            let reply =
                cx.request_model_with_timeout(&messages, role, timeout, token.as_ref()).await;
            let text = match &reply {
                Ok(reply) => reply.content.clone(),
                Err(err) => err.to_string(),
            };
            *self.outcome.lock().unwrap() = Some(text);
            let reply = reply?;
            cx.report_draft(FindingDraft::new(Severity::Info, reply.content));
            Ok(())
        }
    }

    fn run_with(
        provider: Option<MockProvider>,
        timeout: Duration,
        use_run_token: bool,
    ) -> (ToolRun, Arc<Mutex<Option<String>>>) {
        let outcome = Arc::new(Mutex::new(None));
        let tool = AskTool { timeout, use_run_token, outcome: Arc::clone(&outcome) };
        let provider = provider.map(|p| Arc::new(p) as Arc<dyn ModelProvider>);
        let logger = Arc::new(Logger::new(10));
        let run = ToolRun::new(Box::new(tool), "/repo", provider, logger, RunSettings::default());
        (run, outcome)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_within_deadline() {
        let provider =
            MockProvider::new().with_latency(Duration::from_millis(10)).with_reply("short");
        let (run, _) = run_with(Some(provider), Duration::from_secs(1), false);
        let result = run.execute(&ScanOptions::default()).await;
        assert_eq!(result.status, ScanStatus::Completed);
        assert_eq!(result.findings[0].title, "short");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fails_the_call() {
        let provider = MockProvider::new().with_latency(Duration::from_secs(5));
        let (run, outcome) = run_with(Some(provider), Duration::from_millis(100), false);
        let result = run.execute(&ScanOptions::default()).await;
        assert_eq!(result.status, ScanStatus::Failed);
        assert_eq!(
            outcome.lock().unwrap().as_deref(),
            Some("Model error: Model request timed out after 100ms")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_cancellation_wins_over_deadline() {
        let provider = MockProvider::new().with_latency(Duration::from_secs(5));
        let (run, _) = run_with(Some(provider), Duration::from_secs(10), true);
        let run = Arc::new(run);
        let canceller = Arc::clone(&run);
        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let result = run.execute(&ScanOptions::default()).await;
        trigger.await.unwrap();
        assert_eq!(result.status, ScanStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_missing_provider_fails_fast() {
        let (run, outcome) = run_with(None, Duration::from_secs(1), false);
        let result = run.execute(&ScanOptions::default()).await;
        assert_eq!(result.status, ScanStatus::Failed);
        assert_eq!(outcome.lock().unwrap().as_deref(), Some("No model provider available"));
    }
}
