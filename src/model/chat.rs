use super::{ModelCapability, ModelResponse, Usage};
use crate::config::ModelConfig;
use crate::error::GearError;
use crate::history::History;
use crate::message::{Message, MessageExtra, Role};
use crate::pricing::PricingTable;
use crate::retry::{jittered, RetryPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Body of a chat completion request.
///
/// `parameters` are flattened next to `model` and `messages`, matching the
/// OpenAI wire format (`{"model": .., "messages": [..], "temperature": ..}`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(flatten)]
    pub parameters: Map<String, Value>,
}

/// Body of a chat completion response. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResponseMessage {
    #[serde(default = "assistant_role")]
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
}

fn assistant_role() -> Role {
    Role::Assistant
}

impl ChatResponse {
    /// Builds a single-choice assistant response, mostly for stubs.
    pub fn reply(content: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: ResponseMessage {
                    role: Role::Assistant,
                    content: Some(content.into()),
                },
                finish_reason: Some("stop".to_string()),
            }],
            ..Self::default()
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    fn into_model_response(self) -> Result<ModelResponse, ProviderError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("response has no choices".to_string()))?;
        Ok(ModelResponse {
            role: choice.message.role,
            content: choice.message.content.unwrap_or_default().trim().to_string(),
            usage: self.usage,
            model: self.model,
            finish_reason: choice.finish_reason,
        })
    }
}

/// Failures reported by a [`ChatProvider`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    /// The provider refused the request; sending it again will not help.
    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Classifies an HTTP failure status.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            408 => ProviderError::Timeout,
            429 => ProviderError::RateLimited(body),
            500..=599 => ProviderError::Server { status, body },
            _ => ProviderError::Rejected { status, body },
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout
                | ProviderError::RateLimited(_)
                | ProviderError::Server { .. }
                | ProviderError::Transport(_)
        )
    }
}

/// The provider boundary: one chat completion, no retries.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[async_trait]
impl<P: ChatProvider + ?Sized> ChatProvider for std::sync::Arc<P> {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        (**self).complete(request).await
    }
}

/// A model capability backed by a [`ChatProvider`].
///
/// Each invocation appends the user message once, sends the whole history,
/// and retries transient failures with backoff. Failed attempts leave no
/// trace in the history; the assistant reply is appended only on success.
/// Every attempt is bounded by its own timeout, and a timeout is retried
/// like any other transient failure.
///
/// # Examples
///
/// ```no_run
/// use gears::{ChatModel, OpenAiProvider, PricingTable, RetryPolicy};
/// use serde_json::json;
/// use std::time::Duration;
///
/// # fn main() -> Result<(), gears::GearError> {
/// let model = ChatModel::new(OpenAiProvider::from_env()?, "gpt-4o-mini")
///     .with_parameter("temperature", json!(0.2))
///     .with_retry_policy(RetryPolicy::exponential(4, Duration::from_millis(500)))
///     .with_timeout(Duration::from_secs(20))
///     .with_pricing(PricingTable::openai());
/// # Ok(())
/// # }
/// ```
pub struct ChatModel<P> {
    provider: P,
    model: String,
    parameters: Map<String, Value>,
    retry_policy: RetryPolicy,
    jitter: bool,
    attempt_timeout: Duration,
    pricing: PricingTable,
}

impl<P: ChatProvider> ChatModel<P> {
    /// Default model settings: two retries with doubling backoff from one
    /// second, 30 second attempts, OpenAI list prices.
    pub fn new(provider: P, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            parameters: Map::new(),
            retry_policy: RetryPolicy::exponential(2, Duration::from_secs(1)),
            jitter: true,
            attempt_timeout: Duration::from_secs(30),
            pricing: PricingTable::openai(),
        }
    }

    /// Builds a model from deserialized settings.
    pub fn from_config(provider: P, config: &ModelConfig) -> Result<Self, GearError> {
        let retry_policy = config
            .retry
            .policy()
            .map_err(|e| GearError::Configuration(e.to_string()))?;
        if config.timeout_secs == 0 {
            return Err(GearError::Configuration(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            provider,
            model: config.model.clone(),
            parameters: config.parameters.clone(),
            retry_policy,
            jitter: config.retry.jitter,
            attempt_timeout: Duration::from_secs(config.timeout_secs),
            pricing: config.pricing.clone().unwrap_or_else(PricingTable::openai),
        })
    }

    /// Sets one invocation parameter such as `temperature`.
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Toggles the random spread applied to backoff delays.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Limit for a single provider call.
    pub fn with_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let delay = self
            .retry_policy
            .delay_for_attempt(attempt)
            .unwrap_or_default();
        if self.jitter {
            jittered(delay)
        } else {
            delay
        }
    }

    async fn complete_with_retry(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse, GearError> {
        let max_retries = self.retry_policy.max_retries();
        let mut attempt = 0u32;

        loop {
            let outcome = tokio::select! {
                result = timeout(self.attempt_timeout, self.provider.complete(request)) => {
                    result.unwrap_or(Err(ProviderError::Timeout))
                }
                _ = cancel.cancelled() => return Err(GearError::Cancelled),
            };

            match outcome.and_then(ChatResponse::into_model_response) {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < max_retries => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        model = %self.model,
                        attempt = attempt + 1,
                        max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying provider request"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => return Err(GearError::Cancelled),
                    }
                    attempt += 1;
                }
                Err(e) => {
                    return Err(GearError::Provider {
                        model: self.model.clone(),
                        attempts: attempt + 1,
                        source: e,
                    })
                }
            }
        }
    }
}

#[async_trait]
impl<P: ChatProvider> ModelCapability for ChatModel<P> {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(
        &self,
        prompt: &str,
        history: &mut History,
        extra: &MessageExtra,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse, GearError> {
        history.append(Message::user(prompt).with_extra(extra.clone()));

        let request = ChatRequest {
            model: self.model.clone(),
            messages: history.messages().to_vec(),
            parameters: self.parameters.clone(),
        };
        let response = self.complete_with_retry(&request, cancel).await?;

        history.append(Message::assistant(response.content.clone()));

        if let Some(usage) = &response.usage {
            match self.pricing.cost(&self.model, usage) {
                Some(cost) => {
                    debug!(model = %self.model, cost, "Accrued call cost");
                    history.increment_cost(cost);
                }
                None => warn!(model = %self.model, "No pricing entry for model, cost not tracked"),
            }
        }

        Ok(response)
    }
}
