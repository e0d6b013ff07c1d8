use crate::context::Context;
use crate::gear::{Gear, GearName};
use crate::message::Message;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// Identifies one gear step: which gear, at which version, on which input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct StepKey {
    gear: GearName,
    version: u32,
    context: String,
}

/// What a step produced: its output context and the messages it appended.
#[derive(Debug, Clone)]
pub(crate) struct CachedStep<C> {
    pub(crate) context: C,
    pub(crate) messages: Vec<Message>,
}

/// Where the runner looks up and records finished steps.
pub(crate) trait Memo<C>: Sync {
    fn key(&self, gear: &dyn Gear<C>, context: &C) -> Option<StepKey>;

    fn lookup(&self, key: &StepKey) -> Option<CachedStep<C>>;

    fn store(&self, key: StepKey, context: &C, messages: &[Message]);
}

/// Plain runs remember nothing.
pub(crate) struct NoMemo;

impl<C> Memo<C> for NoMemo {
    fn key(&self, _gear: &dyn Gear<C>, _context: &C) -> Option<StepKey> {
        None
    }

    fn lookup(&self, _key: &StepKey) -> Option<CachedStep<C>> {
        None
    }

    fn store(&self, _key: StepKey, _context: &C, _messages: &[Message]) {}
}

/// Results of finished gear steps, keyed by gear name, gear version and the
/// serialized input context.
///
/// A [`Batch`](crate::Batch) consults the cache before every step. On a hit
/// the step's output context is reused and its messages are replayed into
/// the run's history without calling the model, so re-running a batch only
/// pays for steps whose gear or input changed. Bump [`Gear::version`] to
/// force a gear to run again.
pub struct StepCache<C> {
    steps: Mutex<HashMap<StepKey, CachedStep<C>>>,
}

impl<C> StepCache<C> {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached steps.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forgets every cached step.
    pub fn clear(&self) {
        self.lock().clear();
    }

    // Entries are inserted whole, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<StepKey, CachedStep<C>>> {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C> Default for StepCache<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for StepCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepCache").field("steps", &self.len()).finish()
    }
}

impl<C: Context + Clone> Memo<C> for StepCache<C> {
    fn key(&self, gear: &dyn Gear<C>, context: &C) -> Option<StepKey> {
        match serde_json::to_string(context) {
            Ok(context) => Some(StepKey {
                gear: gear.name(),
                version: gear.version(),
                context,
            }),
            Err(e) => {
                warn!(
                    gear = %gear.name(),
                    error = %e,
                    "Context not serializable, step will not be cached"
                );
                None
            }
        }
    }

    fn lookup(&self, key: &StepKey) -> Option<CachedStep<C>> {
        self.lock().get(key).cloned()
    }

    fn store(&self, key: StepKey, context: &C, messages: &[Message]) {
        self.lock().insert(
            key,
            CachedStep {
                context: context.clone(),
                messages: messages.to_vec(),
            },
        );
    }
}
