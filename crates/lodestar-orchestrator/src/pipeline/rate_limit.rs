use async_trait::async_trait;
use lodestar_core::Logger;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::{CommandContext, Middleware, Next};
use crate::error::PolicyRejection;

/// Default invocations allowed per command per window.
pub const DEFAULT_RATE_LIMIT: usize = 10;

const WINDOW: Duration = Duration::from_millis(1000);

/// Per-command sliding one-second window.
///
/// Timestamps are pruned lazily on each check; rejected calls are not
/// recorded. One mutex guards the whole map so check-and-record is atomic.
pub struct RateLimitMiddleware {
    limit: usize,
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
    logger: Arc<Logger>,
}

impl RateLimitMiddleware {
    #[must_use]
    pub fn new(limit: usize, logger: Arc<Logger>) -> Self {
        Self { limit: limit.max(1), windows: Mutex::new(HashMap::new()), logger }
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Records an invocation at `now` unless the window is full.
    fn try_acquire(&self, command: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(command.to_string()).or_default();
        while window.front().is_some_and(|t| now.duration_since(*t) >= WINDOW) {
            window.pop_front();
        }
        if window.len() >= self.limit {
            return false;
        }
        window.push_back(now);
        true
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate-limit"
    }

    async fn handle(&self, cx: &CommandContext, next: Next<'_>) -> anyhow::Result<()> {
        if !self.try_acquire(&cx.command, Instant::now()) {
            let rejection = PolicyRejection::rate_limit_exceeded(&cx.command, self.limit);
            self.logger.warn(
                rejection.message.clone(),
                "pipeline.rate-limit",
                Some(json!({
                    "command": cx.command,
                    "code": rejection.code.as_str(),
                    "limit": self.limit,
                })),
            );
            return Err(rejection.into());
        }
        next.run(cx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RejectionCode;
    use crate::pipeline::Pipeline;

    fn limited(limit: usize) -> Pipeline {
        Pipeline::new(vec![Arc::new(RateLimitMiddleware::new(limit, Arc::new(Logger::new(10))))])
    }

    async fn call(pipeline: &Pipeline, command: &str) -> Result<(), RejectionCode> {
        pipeline
            .run(&CommandContext::new(command), || async { Ok(()) })
            .await
            .map_err(|err| err.downcast_ref::<PolicyRejection>().map(|r| r.code).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_rolls_over() {
        let pipeline = limited(2);

        assert_eq!(call(&pipeline, "tools.lint").await, Ok(()));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(call(&pipeline, "tools.lint").await, Ok(()));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(call(&pipeline, "tools.lint").await, Err(RejectionCode::RateLimitExceeded));
        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(call(&pipeline, "tools.lint").await, Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_plus_one_within_window_is_rejected() {
        let pipeline = limited(DEFAULT_RATE_LIMIT);
        for _ in 0..DEFAULT_RATE_LIMIT {
            assert_eq!(call(&pipeline, "tools.tldr").await, Ok(()));
            tokio::time::advance(Duration::from_millis(50)).await;
        }
        assert_eq!(call(&pipeline, "tools.tldr").await, Err(RejectionCode::RateLimitExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_calls_never_trigger() {
        let pipeline = limited(1);
        for _ in 0..25 {
            assert_eq!(call(&pipeline, "git.commit").await, Ok(()));
            tokio::time::advance(Duration::from_millis(1001)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_have_separate_windows() {
        let pipeline = limited(1);
        assert_eq!(call(&pipeline, "tools.lint").await, Ok(()));
        assert_eq!(call(&pipeline, "tools.tldr").await, Ok(()));
        assert_eq!(call(&pipeline, "tools.lint").await, Err(RejectionCode::RateLimitExceeded));
    }
}
