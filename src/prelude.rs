//! Commonly used types and traits

pub use crate::batch::{Batch, BatchReport};
pub use crate::context::Context;
pub use crate::error::{GearError, TransformError, ValidationError};
pub use crate::gear::{Gear, GearConfig, GearName, Transition};
pub use crate::history::History;
pub use crate::message::{Message, Role};
pub use crate::model::{ChatModel, Echo, ModelCapability, ModelResponse, OpenAiProvider, Usage};
pub use crate::runner::Runner;
