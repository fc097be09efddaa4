//! Middleware pipeline applied to every command invocation.
//!
//! Middlewares nest like a call stack: each one receives a [`Next`] and
//! proceeds by calling [`Next::run`], which invokes the next middleware and
//! finally the command handler. `Next` is consumed by value, so a
//! middleware proceeds at most once; dropping it short-circuits the chain.
//!
//! The standard chain, outermost first, is
//! [`LoggingMiddleware`] → [`PermissionMiddleware`] →
//! [`RateLimitMiddleware`] → [`AuditMiddleware`].

mod audit;
mod logging;
mod permission;
mod rate_limit;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use lodestar_core::config::PipelineConfig;
use lodestar_core::Logger;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

pub use audit::AuditMiddleware;
pub use logging::LoggingMiddleware;
pub use permission::{DenyList, PermissionCheck, PermissionMiddleware};
pub use rate_limit::RateLimitMiddleware;

/// What a middleware sees of a command invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandContext {
    /// Command name, e.g. `git.commit` or `tools.lint`.
    pub command: String,
    /// Handler-visible arguments.
    pub args: Value,
}

impl CommandContext {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), args: Value::Null }
    }

    #[must_use]
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }
}

type Handler<'a> = Box<dyn FnOnce() -> BoxFuture<'a, anyhow::Result<()>> + Send + 'a>;

/// Continuation to the rest of the chain.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    handler: Handler<'a>,
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").field("remaining", &self.chain.len()).finish_non_exhaustive()
    }
}

impl Next<'_> {
    /// Invokes the next middleware, or the handler at the end of the chain.
    ///
    /// # Errors
    /// Whatever an inner layer or the handler returned, unchanged.
    pub async fn run(self, cx: &CommandContext) -> anyhow::Result<()> {
        match self.chain.split_first() {
            Some((middleware, rest)) => {
                middleware.handle(cx, Next { chain: rest, handler: self.handler }).await
            }
            None => (self.handler)().await,
        }
    }
}

/// A composable wrapper around command execution.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Short name used in logs and ordering checks.
    fn name(&self) -> &'static str;

    /// Handles one invocation. Proceeds by calling `next.run(cx)`.
    async fn handle(&self, cx: &CommandContext, next: Next<'_>) -> anyhow::Result<()>;
}

/// An explicit, ordered middleware chain.
#[derive(Clone, Default)]
pub struct Pipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Pipeline {
    /// Builds a pipeline from middlewares listed outermost first.
    #[must_use]
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    /// The standard chain: logging, permission, rate limit, audit.
    #[must_use]
    pub fn standard(
        config: &PipelineConfig,
        logger: Arc<Logger>,
        permission: Arc<dyn PermissionCheck>,
    ) -> Self {
        Self::new(vec![
            Arc::new(LoggingMiddleware::new(Arc::clone(&logger))),
            Arc::new(PermissionMiddleware::new(permission, Arc::clone(&logger))),
            Arc::new(RateLimitMiddleware::new(config.rate_limit_per_second, Arc::clone(&logger))),
            Arc::new(AuditMiddleware::new(config.audited_commands.iter().cloned(), logger)),
        ])
    }

    /// Names of the middlewares, outermost first.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Runs `handler` through the chain and returns its output.
    ///
    /// # Errors
    /// The handler's error or a [`crate::PolicyRejection`], as the original
    /// value inside the `anyhow::Error`.
    pub async fn run<T, F, Fut>(&self, cx: &CommandContext, handler: F) -> anyhow::Result<T>
    where
        T: Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = anyhow::Result<T>> + Send,
    {
        let mut output = None;
        let slot = &mut output;
        let next = Next {
            chain: &self.middlewares,
            handler: Box::new(move || {
                async move {
                    *slot = Some(handler().await?);
                    Ok(())
                }
                .boxed()
            }),
        };
        next.run(cx).await?;
        output.ok_or_else(|| {
            anyhow!("command '{}' completed without running its handler", cx.command)
        })
    }
}
