use super::{ModelCapability, ModelResponse};
use crate::error::GearError;
use crate::history::History;
use crate::message::{Message, MessageExtra};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A capability that answers with the prompt it was given.
///
/// Useful for dry runs of a gear chain: templates, transforms and routing
/// all execute, nothing leaves the process and no cost accrues.
///
/// ```
/// use gears::{Echo, History, MessageExtra, ModelCapability};
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test::block_on(async {
/// let mut history = History::new();
/// let reply = Echo::new()
///     .invoke("hello", &mut history, &MessageExtra::new(), &CancellationToken::new())
///     .await
///     .unwrap();
/// assert_eq!(reply.content, "hello");
/// assert_eq!(history.len(), 2);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Echo {
    name: String,
}

impl Echo {
    pub fn new() -> Self {
        Self {
            name: "echo".to_string(),
        }
    }

    /// Reports a different model name, e.g. to exercise pricing lookups.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for Echo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelCapability for Echo {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        prompt: &str,
        history: &mut History,
        extra: &MessageExtra,
        cancel: &CancellationToken,
    ) -> Result<ModelResponse, GearError> {
        if cancel.is_cancelled() {
            return Err(GearError::Cancelled);
        }
        history.append(Message::user(prompt).with_extra(extra.clone()));
        history.append(Message::assistant(prompt));
        Ok(ModelResponse::assistant(prompt))
    }
}
