use async_trait::async_trait;
use lodestar_core::Logger;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use super::{CommandContext, Middleware, Next};
use crate::error::PolicyRejection;

/// Decides whether a command may run.
pub trait PermissionCheck: Send + Sync {
    fn is_allowed(&self, command: &str) -> bool;
}

impl<F> PermissionCheck for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_allowed(&self, command: &str) -> bool {
        self(command)
    }
}

/// Allows everything except the listed commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenyList {
    denied: HashSet<String>,
}

impl DenyList {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { denied: commands.into_iter().map(Into::into).collect() }
    }
}

impl PermissionCheck for DenyList {
    fn is_allowed(&self, command: &str) -> bool {
        !self.denied.contains(command)
    }
}

/// Sole access-control chokepoint. Rejects with `PERMISSION_DENIED`.
pub struct PermissionMiddleware {
    check: Arc<dyn PermissionCheck>,
    logger: Arc<Logger>,
}

impl PermissionMiddleware {
    #[must_use]
    pub fn new(check: Arc<dyn PermissionCheck>, logger: Arc<Logger>) -> Self {
        Self { check, logger }
    }
}

#[async_trait]
impl Middleware for PermissionMiddleware {
    fn name(&self) -> &'static str {
        "permission"
    }

    async fn handle(&self, cx: &CommandContext, next: Next<'_>) -> anyhow::Result<()> {
        if !self.check.is_allowed(&cx.command) {
            let rejection = PolicyRejection::permission_denied(&cx.command);
            self.logger.warn(
                rejection.message.clone(),
                "pipeline.permission",
                Some(json!({ "command": cx.command, "code": rejection.code.as_str() })),
            );
            return Err(rejection.into());
        }
        next.run(cx).await
    }
}
