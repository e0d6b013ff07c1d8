use crate::cache::{Memo, NoMemo};
use crate::context::Context;
use crate::error::{GearError, TransformError};
use crate::gear::{Gear, Transition};
use crate::history::History;
use crate::message::MessageExtra;
use serde_json::Value;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives a gear chain to completion.
///
/// The runner holds only settings, so one runner can drive any number of
/// independent runs, concurrently if desired; each run brings its own
/// context and [`History`].
///
/// A run is a loop over "current gear + current context": render the
/// prompt, invoke the gear's model, transform the reply (redoing the whole
/// step while the gear's transform retry budget lasts), then follow
/// [`Gear::next`]. Chains of any length run in constant stack space.
///
/// Cancellation is checked before every render and raced against provider
/// calls and backoff waits.
pub struct Runner {
    cancel: CancellationToken,
    max_steps: Option<usize>,
    message_extra: MessageExtra,
}

enum RunState<C> {
    Running(Box<dyn Gear<C>>, C),
    Completed(C),
    Failed(GearError),
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("max_steps", &self.max_steps)
            .field("message_extra", &self.message_extra)
            .finish()
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            max_steps: None,
            message_extra: MessageExtra::new(),
        }
    }

    /// Uses `cancel` to stop runs from outside.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Aborts a run after `max_steps` completed or attempted steps.
    /// Unlimited by default.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    /// Adds an attribute to every user message sent during a run.
    pub fn with_message_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.message_extra.insert(key.into(), value);
        self
    }

    /// Token that cancels runs driven by this runner.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs `gear` and its successors starting from `context`.
    ///
    /// Returns the context produced by the last gear. On failure the error
    /// is returned and `history` keeps every message and cost recorded up
    /// to that point.
    pub async fn run<C, G>(&self, context: C, history: &mut History, gear: G) -> Result<C, GearError>
    where
        C: Context,
        G: Gear<C> + 'static,
    {
        self.drive(context, history, Box::new(gear), &NoMemo).await
    }

    /// The run loop. Every step is looked up in `memo` first and recorded
    /// there once it completes.
    pub(crate) async fn drive<C, M>(
        &self,
        context: C,
        history: &mut History,
        gear: Box<dyn Gear<C>>,
        memo: &M,
    ) -> Result<C, GearError>
    where
        C: Context,
        M: Memo<C>,
    {
        context.validate()?;

        let start_cost = history.cost();
        let mut steps = 0usize;
        let mut state = RunState::Running(gear, context);

        loop {
            state = match state {
                RunState::Running(gear, context) => {
                    if let Some(limit) = self.max_steps {
                        if steps >= limit {
                            RunState::Failed(GearError::MaxStepsExceeded { limit })
                        } else {
                            steps += 1;
                            self.step(gear, context, history, memo).await
                        }
                    } else {
                        steps += 1;
                        self.step(gear, context, history, memo).await
                    }
                }
                RunState::Completed(context) => {
                    info!(
                        steps,
                        messages = history.len(),
                        cost = history.cost() - start_cost,
                        total_cost = history.cost(),
                        "Run completed"
                    );
                    return Ok(context);
                }
                RunState::Failed(error) => {
                    warn!(
                        steps,
                        cost = history.cost() - start_cost,
                        error = %error,
                        "Run failed"
                    );
                    return Err(error);
                }
            };
        }
    }

    async fn step<C, M>(
        &self,
        gear: Box<dyn Gear<C>>,
        context: C,
        history: &mut History,
        memo: &M,
    ) -> RunState<C>
    where
        C: Context,
        M: Memo<C>,
    {
        if self.cancel.is_cancelled() {
            return RunState::Failed(GearError::Cancelled);
        }

        let name = gear.name();
        let key = memo.key(&*gear, &context);
        let next_context = match key.as_ref().and_then(|key| memo.lookup(key)) {
            Some(cached) => {
                debug!(gear = %name, messages = cached.messages.len(), "Reusing cached step");
                for message in cached.messages {
                    history.append(message);
                }
                cached.context
            }
            None => {
                let start = history.len();
                let next_context = match self.attempt(&*gear, &context, history).await {
                    Ok(next_context) => next_context,
                    Err(e) => return RunState::Failed(e),
                };
                if let Some(key) = key {
                    memo.store(key, &next_context, &history.messages()[start..]);
                }
                next_context
            }
        };

        info!("Gear '{}' completed", name);
        match gear.next(&next_context) {
            Transition::Continue(next) => {
                debug!(from = %name, to = %next.name(), "Switching gear");
                RunState::Running(next, next_context)
            }
            Transition::Complete => RunState::Completed(next_context),
            Transition::Fail(details) => RunState::Failed(GearError::Routing { gear: name, details }),
        }
    }

    /// Render, invoke and transform, redoing all three while the gear's
    /// transform retry budget lasts.
    async fn attempt<C: Context>(
        &self,
        gear: &dyn Gear<C>,
        context: &C,
        history: &mut History,
    ) -> Result<C, GearError> {
        let name = gear.name();
        let config = gear.config();
        let mut extra = self.message_extra.clone();
        extra.extend(config.message_extra.clone());

        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(GearError::Cancelled);
            }

            let prompt = gear
                .render(context)
                .map_err(|source| GearError::Render { gear: name.clone(), source })?;
            debug!(gear = %name, attempt, prompt = %prompt, "Invoking model");

            let response = gear
                .model()
                .invoke(&prompt, history, &extra, &self.cancel)
                .await?;

            let transformed = gear
                .transform(&response, context)
                .and_then(|c| c.validate().map(|_| c).map_err(TransformError::from));
            match transformed {
                Ok(c) => return Ok(c),
                Err(e) if attempt < config.max_transform_retries => {
                    attempt += 1;
                    warn!(
                        "Gear '{}' transform failed, redoing step ({}/{}): {}",
                        name, attempt, config.max_transform_retries, e
                    );
                }
                Err(e) => {
                    return Err(GearError::Transform {
                        gear: name,
                        attempts: attempt + 1,
                        details: e.to_string(),
                    })
                }
            }
        }
    }
}
