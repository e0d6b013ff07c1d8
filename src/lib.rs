//! # Gears
//!
//! Typed, lazily discovered chains of language-model calls.
//!
//! A [`Gear`] renders a prompt from a typed [`Context`], sends it to a model
//! through a [`ModelCapability`], turns the reply into the next context and
//! picks the gear that runs next. The [`Runner`] drives the chain: it keeps a
//! shared, append-only [`History`] of messages and accumulated cost, retries
//! failing transforms within each gear's budget, and stops on completion,
//! routing failure or cancellation.
//!
//! ## Features
//!
//! - **Typed contexts**: every step takes and returns your own struct, validated at each boundary
//! - **Lazy chains**: successors are built in [`Gear::next`], so branches are discovered at run time
//! - **Provider retries**: exponential backoff with jitter and a per-attempt timeout (default: 30s)
//! - **Cost tracking**: token usage priced per model and summed in the [`History`]
//! - **Cancellation**: a [`CancellationToken`] stops a run between steps or mid-call
//! - **Batches**: run a chain over many contexts concurrently, reusing cached steps with [`Batch`]
//! - **Structured errors**: one [`GearError`] enum built with `thiserror`
//!
//! ## Quick Start
//!
//! ```rust
//! use gears::prelude::*;
//! use serde::Serialize;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Serialize)]
//! struct Topic {
//!     subject: String,
//!     outline: Vec<String>,
//! }
//! impl Context for Topic {}
//!
//! struct Outline {
//!     model: Arc<dyn ModelCapability>,
//! }
//!
//! impl Gear<Topic> for Outline {
//!     fn model(&self) -> &dyn ModelCapability {
//!         self.model.as_ref()
//!     }
//!
//!     fn template(&self) -> &str {
//!         "List three sections about {{ subject }}"
//!     }
//!
//!     fn transform(&self, response: &ModelResponse, context: &Topic) -> Result<Topic, TransformError> {
//!         Ok(Topic {
//!             subject: context.subject.clone(),
//!             outline: response.content.lines().map(str::to_string).collect(),
//!         })
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! // Echo answers with the prompt; swap in a ChatModel for real calls
//! let gear = Outline { model: Arc::new(Echo::new()) };
//! let mut history = History::with_system("You are a concise technical writer.");
//!
//! let topic = Runner::new()
//!     .run(Topic { subject: "Rust".into(), outline: vec![] }, &mut history, gear)
//!     .await
//!     .expect("run failed");
//!
//! assert_eq!(topic.outline, vec!["List three sections about Rust"]);
//! assert_eq!(history.len(), 3);
//! # }
//! ```
//!
//! ## Branching
//!
//! ```rust
//! use gears::prelude::*;
//! use serde::Serialize;
//! use std::sync::Arc;
//!
//! #[derive(Debug, Serialize)]
//! struct Ticket {
//!     text: String,
//!     urgent: bool,
//! }
//! impl Context for Ticket {}
//!
//! struct Triage(Arc<dyn ModelCapability>);
//! struct Escalate(Arc<dyn ModelCapability>);
//!
//! impl Gear<Ticket> for Triage {
//!     fn model(&self) -> &dyn ModelCapability {
//!         self.0.as_ref()
//!     }
//!     fn template(&self) -> &str {
//!         "{{ text }}"
//!     }
//!     fn transform(&self, r: &ModelResponse, _: &Ticket) -> Result<Ticket, TransformError> {
//!         Ok(Ticket { text: r.content.clone(), urgent: r.content.contains("outage") })
//!     }
//!     fn next(&self, ticket: &Ticket) -> Transition<Ticket> {
//!         if ticket.urgent {
//!             Transition::next(Escalate(self.0.clone()))
//!         } else {
//!             Transition::done()
//!         }
//!     }
//! }
//!
//! impl Gear<Ticket> for Escalate {
//!     fn model(&self) -> &dyn ModelCapability {
//!         self.0.as_ref()
//!     }
//!     fn template(&self) -> &str {
//!         "ESCALATED: {{ text }}"
//!     }
//!     fn transform(&self, r: &ModelResponse, t: &Ticket) -> Result<Ticket, TransformError> {
//!         Ok(Ticket { text: r.content.clone(), urgent: t.urgent })
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let echo: Arc<dyn ModelCapability> = Arc::new(Echo::new());
//! let mut history = History::new();
//! let ticket = Runner::new()
//!     .run(Ticket { text: "outage in eu-west".into(), urgent: false }, &mut history, Triage(echo))
//!     .await
//!     .expect("run failed");
//! assert_eq!(ticket.text, "ESCALATED: outage in eu-west");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! ```rust
//! use gears::GearError;
//!
//! fn report(error: &GearError) {
//!     match error {
//!         GearError::Provider { model, attempts, source } => {
//!             eprintln!("{model} failed {attempts} time(s): {source}");
//!         }
//!         GearError::Transform { gear, details, .. } => {
//!             eprintln!("could not parse output of {gear}: {details}");
//!         }
//!         GearError::Cancelled => eprintln!("stopped"),
//!         _ => eprintln!("Error: {error}"),
//!     }
//! }
//! # report(&GearError::Cancelled);
//! ```

mod batch;
mod cache;
mod config;
mod context;
mod error;
mod gear;
mod history;
mod logging;
mod message;
mod model;
mod pricing;
mod retry;
mod runner;
mod template;

pub mod json;
pub mod prelude;

pub use batch::{Batch, BatchReport, BatchRun};
pub use cache::StepCache;
pub use config::{ModelConfig, RetryConfig};
pub use context::{validated, Context};
pub use error::{GearError, TemplateError, TransformError, ValidationError};
pub use gear::{Gear, GearConfig, GearName, Transition};
pub use history::History;
pub use logging::init_tracing;
pub use message::{Message, MessageExtra, Role};
pub use model::{
    ChatModel, ChatProvider, ChatRequest, ChatResponse, Choice, Echo, ModelCapability,
    ModelResponse, OpenAiProvider, ProviderError, ResponseMessage, Usage,
};
pub use pricing::{Pricing, PricingTable};
pub use retry::{RetryPolicy, RetryPolicyError};
pub use runner::Runner;
pub use template::{render as render_template, Template};

pub use tokio_util::sync::CancellationToken;
