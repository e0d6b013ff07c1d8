//! Model capabilities: the only place a run waits on the outside world.

mod chat;
mod echo;
mod openai;

pub use chat::{ChatModel, ChatProvider, ChatRequest, ChatResponse, Choice, ProviderError, ResponseMessage};
pub use echo::Echo;
pub use openai::OpenAiProvider;

use crate::error::GearError;
use crate::history::History;
use crate::message::{MessageExtra, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Token counts reported by a provider for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// The reply a gear's transform interprets.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub role: Role,
    pub content: String,
    pub usage: Option<Usage>,
    /// Model that actually served the request, if the provider said so.
    pub model: Option<String>,
    pub finish_reason: Option<String>,
}

impl ModelResponse {
    /// An assistant reply with no provider metadata.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            usage: None,
            model: None,
            finish_reason: None,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Something a gear can ask for a completion.
///
/// An implementation must append the user message built from `prompt` and
/// `extra` to `history`, call its model, append the reply as an assistant
/// message and add the call's cost when it can be computed. Cost is
/// best-effort: a missing price is logged, never an error.
///
/// `cancel` is raised when the run is cancelled; long waits should race it
/// and return [`GearError::Cancelled`].
#[async_trait]
pub trait ModelCapability: Send + Sync {
    /// Model identifier used in requests, logs and pricing lookups.
    fn model_name(&self) -> &str;

    async fn invoke(
        &self,
        prompt: &str,
        history: &mut History,
        extra: &MessageExtra,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse, GearError>;
}
