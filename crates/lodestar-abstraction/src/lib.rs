//! Model provider abstraction for Lodestar.
//!
//! This crate defines the contract every language-model backend implements and
//! the message types exchanged with it. Analysis tools never talk to a concrete
//! provider; they receive an `Arc<dyn ModelProvider>` through their dependency
//! bundle.

pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use mock::MockProvider;

/// Represents an error that can occur when interacting with a model provider.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// An error occurred during the request (e.g., network issues, invalid request).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The model returned an error (e.g., invalid input, rate limiting).
    #[error("Model Response Error: {0}")]
    ModelResponseError(String),

    /// The provider is not configured or currently unreachable.
    #[error("Model provider unavailable: {0}")]
    Unavailable(String),

    /// The request did not finish before its deadline.
    #[error("Model request timed out after {0}ms")]
    Timeout(u64),

    /// The request was cancelled by its caller.
    #[error("Model request cancelled")]
    Cancelled,

    /// Other unexpected errors.
    #[error("Other Model Error: {0}")]
    Other(String),
}

/// The role a request plays, used by providers to pick a model tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    /// Cheap, fast model for short classification or summary prompts.
    Fast,
    /// Default model for analysis prompts.
    #[default]
    Standard,
    /// Strongest available model for review-style prompts.
    Deep,
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Standard => write!(f, "standard"),
            Self::Deep => write!(f, "deep"),
        }
    }
}

/// Represents a message in a conversation with a chat model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message sender (e.g., "user", "assistant", "system").
    pub role: String,
    /// The content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// The reply produced by a provider for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelReply {
    /// The generated content.
    pub content: String,
    /// The ID of the model that produced the reply.
    pub model: String,
    /// Why generation stopped (e.g., "end_turn", "max_tokens").
    pub stop_reason: Option<String>,
}

/// A trait for sending requests to a language-model provider.
///
/// Implementations must observe `cancellation`: once it fires the request
/// should finish with [`ModelError::Cancelled`] as soon as practical. Retry
/// policy, if any, belongs to the implementation.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Sends a chat request.
    ///
    /// # Errors
    /// Returns a `ModelError` if the request fails, times out or is cancelled.
    async fn send_request(
        &self,
        messages: &[ChatMessage],
        role: ModelRole,
        cancellation: CancellationToken,
    ) -> Result<ModelReply, ModelError>;

    /// Returns the identifier of the provider (e.g., "mock", "anthropic").
    fn provider_id(&self) -> &str;
}
