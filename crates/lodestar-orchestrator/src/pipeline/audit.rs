use async_trait::async_trait;
use chrono::Utc;
use lodestar_core::Logger;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use super::{CommandContext, Middleware, Next};

/// Logs an audit record for sensitive commands. Never rejects.
pub struct AuditMiddleware {
    audited: HashSet<String>,
    logger: Arc<Logger>,
}

impl AuditMiddleware {
    pub fn new<I, S>(audited: I, logger: Arc<Logger>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { audited: audited.into_iter().map(Into::into).collect(), logger }
    }

    #[must_use]
    pub fn is_audited(&self, command: &str) -> bool {
        self.audited.contains(command)
    }
}

#[async_trait]
impl Middleware for AuditMiddleware {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn handle(&self, cx: &CommandContext, next: Next<'_>) -> anyhow::Result<()> {
        if self.is_audited(&cx.command) {
            self.logger.info(
                format!("Audit: {}", cx.command),
                "pipeline.audit",
                Some(json!({ "command": cx.command, "timestamp": Utc::now().to_rfc3339() })),
            );
        }
        next.run(cx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use lodestar_core::config::PipelineConfig;
    use lodestar_core::LogLevel;

    fn audited() -> (Pipeline, Arc<Logger>) {
        let logger = Arc::new(Logger::new(10));
        let middleware =
            AuditMiddleware::new(PipelineConfig::default().audited_commands, Arc::clone(&logger));
        (Pipeline::new(vec![Arc::new(middleware)]), logger)
    }

    #[tokio::test]
    async fn test_sensitive_command_gets_one_record_per_call() {
        let (pipeline, logger) = audited();
        pipeline.run(&CommandContext::new("git.commit"), || async { Ok(()) }).await.unwrap();
        assert_eq!(logger.entries_at(LogLevel::Info).len(), 1);
        pipeline.run(&CommandContext::new("git.commit"), || async { Ok(()) }).await.unwrap();

        let records = logger.entries_at(LogLevel::Info);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source, "pipeline.audit");
        assert!(records[0].data.as_ref().unwrap()["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_other_commands_are_not_audited() {
        let (pipeline, logger) = audited();
        pipeline.run(&CommandContext::new("lint"), || async { Ok(()) }).await.unwrap();
        assert!(logger.is_empty());
    }

    #[tokio::test]
    async fn test_audit_never_blocks_failures() {
        let (pipeline, _) = audited();
        let err = pipeline
            .run(&CommandContext::new("git.stage"), || async {
                Err::<(), _>(anyhow::anyhow!("index locked"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "index locked");
    }
}
