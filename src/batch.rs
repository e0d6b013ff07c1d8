use crate::cache::{Memo, StepCache};
use crate::context::Context;
use crate::error::GearError;
use crate::gear::{Gear, Transition};
use crate::history::History;
use crate::runner::Runner;
use futures::future::join_all;
use tracing::info;

/// Outcome of one context in a batch.
#[derive(Debug)]
pub struct BatchRun<C> {
    pub result: Result<C, GearError>,
    /// This run's own history, starting from the batch seed.
    pub history: History,
}

/// Outcome of [`Batch::run`], in input order.
#[derive(Debug)]
pub struct BatchReport<C> {
    pub runs: Vec<BatchRun<C>>,
    /// What this call spent. Cached steps cost nothing.
    pub cost: f64,
}

impl<C> BatchReport<C> {
    /// Contexts of the runs that completed, in input order.
    pub fn completed(&self) -> impl Iterator<Item = &C> {
        self.runs.iter().filter_map(|run| run.result.as_ref().ok())
    }

    pub fn failed(&self) -> usize {
        self.runs.iter().filter(|run| run.result.is_err()).count()
    }
}

/// Runs one gear chain over many contexts at once.
///
/// Every context gets its own [`History`], cloned from the seed, and its own
/// root gear from the factory passed to [`run`](Batch::run). Finished steps
/// are kept in a [`StepCache`] that outlives the call: running the batch
/// again only calls models for steps whose gear, gear version or input
/// context changed, which makes iterating on one gear of a long chain cheap.
///
/// ```
/// use gears::prelude::*;
/// use serde::Serialize;
///
/// #[derive(Debug, Clone, Serialize)]
/// struct Line {
///     text: String,
/// }
/// impl Context for Line {}
///
/// struct Repeat(Echo);
///
/// impl Gear<Line> for Repeat {
///     fn model(&self) -> &dyn ModelCapability {
///         &self.0
///     }
///     fn template(&self) -> &str {
///         "again: {{ text }}"
///     }
///     fn transform(&self, r: &ModelResponse, _: &Line) -> Result<Line, TransformError> {
///         Ok(Line { text: r.content.clone() })
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let mut batch = Batch::new(Runner::new());
/// let lines = vec![Line { text: "a".into() }, Line { text: "b".into() }];
///
/// let report = batch.run(lines.clone(), || Repeat(Echo::new())).await;
/// let texts: Vec<_> = report.completed().map(|line| line.text.as_str()).collect();
/// assert_eq!(texts, ["again: a", "again: b"]);
///
/// batch.run(lines, || Repeat(Echo::new())).await;
/// assert_eq!(batch.cache().len(), 2);
/// # });
/// ```
pub struct Batch<C> {
    runner: Runner,
    seed: History,
    cache: StepCache<C>,
    cost: f64,
}

impl<C> std::fmt::Debug for Batch<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("runner", &self.runner)
            .field("seed", &self.seed.len())
            .field("cache", &self.cache)
            .field("cost", &self.cost)
            .finish()
    }
}

impl<C: Context + Clone> Batch<C> {
    pub fn new(runner: Runner) -> Self {
        Self {
            runner,
            seed: History::new(),
            cache: StepCache::new(),
            cost: 0.0,
        }
    }

    /// Starts every run's history from `seed`, e.g. a shared system prompt.
    pub fn with_seed(mut self, seed: History) -> Self {
        self.seed = seed;
        self
    }

    /// Total spent across every call to [`run`](Batch::run).
    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn cache(&self) -> &StepCache<C> {
        &self.cache
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Runs a fresh root gear from `make_gear` on every context concurrently.
    ///
    /// A failing run does not affect the others; its error and partial
    /// history are reported in its [`BatchRun`].
    pub async fn run<G, F>(&mut self, contexts: Vec<C>, make_gear: F) -> BatchReport<C>
    where
        G: Gear<C> + 'static,
        F: Fn() -> G,
    {
        let runner = &self.runner;
        let cache = &self.cache;
        let seed = &self.seed;

        let runs = contexts.into_iter().map(move |context| {
            let gear: Box<dyn Gear<C>> = Box::new(make_gear());
            let mut history = seed.clone();
            async move {
                let result = runner.drive(context, &mut history, gear, cache).await;
                BatchRun { result, history }
            }
        });
        let runs: Vec<BatchRun<C>> = join_all(runs).await;

        let cost: f64 = runs
            .iter()
            .map(|run| run.history.cost() - self.seed.cost())
            .sum();
        self.cost += cost;

        let failed = runs.iter().filter(|run| run.result.is_err()).count();
        if cost > 0.0 {
            info!(
                runs = runs.len(),
                failed,
                cost,
                total_cost = self.cost,
                "Batch completed"
            );
        } else {
            info!(
                runs = runs.len(),
                failed,
                total_cost = self.cost,
                "Batch completed without new model calls"
            );
        }

        BatchReport { runs, cost }
    }

    /// Whether running `contexts` again would call any model, because some
    /// step along a chain is missing from the cache.
    ///
    /// Walks each chain through cached results only, following
    /// [`Gear::next`] so that version bumps on later gears are noticed too.
    pub fn is_stale<G, F>(&self, contexts: &[C], make_gear: F) -> bool
    where
        G: Gear<C> + 'static,
        F: Fn() -> G,
    {
        contexts.iter().any(|context| {
            let mut gear: Box<dyn Gear<C>> = Box::new(make_gear());
            let mut context = context.clone();
            loop {
                let cached = self
                    .cache
                    .key(&*gear, &context)
                    .and_then(|key| self.cache.lookup(&key));
                let Some(cached) = cached else {
                    return true;
                };
                match gear.next(&cached.context) {
                    Transition::Continue(next) => {
                        gear = next;
                        context = cached.context;
                    }
                    Transition::Complete | Transition::Fail(_) => return false,
                }
            }
        })
    }

    /// Forgets every cached step so the next run calls the models again.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
