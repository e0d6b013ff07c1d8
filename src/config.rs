//! Deserializable settings for chat models.

use crate::pricing::PricingTable;
use crate::retry::{RetryPolicy, RetryPolicyError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Settings for a [`ChatModel`](crate::ChatModel).
///
/// ```
/// use gears::ModelConfig;
///
/// let config: ModelConfig = serde_json::from_str(
///     r#"{"model": "gpt-4o-mini", "parameters": {"temperature": 0.0}}"#,
/// ).unwrap();
/// assert_eq!(config.retry.max_retries, 2);
/// assert_eq!(config.timeout_secs, 30);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    /// Sent with every request, e.g. `temperature` or `max_tokens`.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Limit for a single provider call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Prices used for cost accrual. Defaults to
    /// [`PricingTable::openai`] when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<PricingTable>,
}

impl ModelConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            parameters: Map::new(),
            retry: RetryConfig::default(),
            timeout_secs: default_timeout_secs(),
            pricing: None,
        }
    }
}

/// Exponential backoff for transient provider failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// Doubling backoff built from these settings.
    pub fn policy(&self) -> Result<RetryPolicy, RetryPolicyError> {
        RetryPolicy::exponential_backoff(
            self.max_retries,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            2,
        )
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    60_000
}

fn default_jitter() -> bool {
    true
}
