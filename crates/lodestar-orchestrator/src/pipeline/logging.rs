use async_trait::async_trait;
use lodestar_core::Logger;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use super::{CommandContext, Middleware, Next};

const SOURCE: &str = "pipeline.logging";

/// Records start, completion time and failures of every command.
///
/// Errors are logged and returned unchanged.
pub struct LoggingMiddleware {
    logger: Arc<Logger>,
}

impl LoggingMiddleware {
    #[must_use]
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn handle(&self, cx: &CommandContext, next: Next<'_>) -> anyhow::Result<()> {
        let started = Instant::now();
        self.logger.debug(
            format!("Command started: {}", cx.command),
            SOURCE,
            Some(json!({ "command": cx.command })),
        );

        let result = next.run(cx).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match &result {
            Ok(()) => self.logger.info(
                format!("Command completed: {} ({duration_ms}ms)", cx.command),
                SOURCE,
                Some(json!({ "command": cx.command, "duration_ms": duration_ms })),
            ),
            Err(err) => self.logger.error(
                format!("Command failed: {} after {duration_ms}ms: {err}", cx.command),
                SOURCE,
                Some(json!({
                    "command": cx.command,
                    "duration_ms": duration_ms,
                    "error": err.to_string(),
                })),
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use lodestar_core::LogLevel;

    #[tokio::test]
    async fn test_failure_logged_once_and_error_propagates() {
        let logger = Arc::new(Logger::new(10));
        let pipeline = Pipeline::new(vec![Arc::new(LoggingMiddleware::new(Arc::clone(&logger)))]);

        let err = pipeline
            .run(&CommandContext::new("tools.lint"), || async {
                Err::<(), _>(anyhow::anyhow!("boom"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "boom");
        let errors = logger.entries_at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("boom"));
        let data = errors[0].data.as_ref().unwrap();
        assert!(data["duration_ms"].is_u64());
        assert_eq!(data["error"], "boom");
        assert!(logger.entries_at(LogLevel::Info).is_empty());
    }

    #[tokio::test]
    async fn test_success_logs_start_and_completion() {
        let logger = Arc::new(Logger::new(10));
        let pipeline = Pipeline::new(vec![Arc::new(LoggingMiddleware::new(Arc::clone(&logger)))]);
        pipeline.run(&CommandContext::new("tools.tldr"), || async { Ok(()) }).await.unwrap();

        assert_eq!(logger.entries_at(LogLevel::Debug).len(), 1);
        let infos = logger.entries_at(LogLevel::Info);
        assert_eq!(infos.len(), 1);
        assert!(infos[0].message.starts_with("Command completed: tools.tldr"));
        assert!(logger.entries_at(LogLevel::Error).is_empty());
    }
}
