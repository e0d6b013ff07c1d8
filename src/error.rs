use crate::gear::GearName;
use crate::model::ProviderError;
use thiserror::Error;

/// A context value failed its own validation.
///
/// Returned by [`Context::validate`](crate::Context::validate). When the
/// initial context of a run is invalid the run aborts with
/// [`GearError::Validation`]; when a transformed context is invalid the
/// failure is treated like any other transform failure and may be retried.
///
/// # Examples
///
/// ```
/// use gears::ValidationError;
///
/// let error = ValidationError::missing("name");
/// assert_eq!(error.to_string(), "field `name`: required field is missing");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", describe_validation(.field, .message))]
pub struct ValidationError {
    /// The offending field, when the failure is attributable to one.
    pub field: Option<String>,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    /// Creates an error that is not tied to a single field.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    /// A required field has no value.
    pub fn missing(field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: "required field is missing".to_string(),
        }
    }

    /// A field has a value that breaks its constraint.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

fn describe_validation(field: &Option<String>, message: &str) -> String {
    match field {
        Some(field) => format!("field `{field}`: {message}"),
        None => message.to_string(),
    }
}

/// A gear could not interpret a model response.
///
/// Returned from [`Gear::transform`](crate::Gear::transform). The runner
/// redoes the whole step while the gear's retry budget lasts, then reports
/// [`GearError::Transform`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransformError(pub String);

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<serde_json::Error> for TransformError {
    fn from(e: serde_json::Error) -> Self {
        Self(format!("malformed JSON: {e}"))
    }
}

impl From<ValidationError> for TransformError {
    fn from(e: ValidationError) -> Self {
        Self(format!("invalid context: {e}"))
    }
}

/// Errors raised while rendering a prompt template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The template references a path the context does not define.
    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),

    /// The template text itself is malformed.
    #[error("template syntax error: {0}")]
    Syntax(String),

    /// The context could not be turned into template data.
    #[error("context is not serializable: {0}")]
    Context(String),

    /// Rendering failed for another reason, e.g. a filter applied to the
    /// wrong type.
    #[error("template rendering failed: {0}")]
    Render(String),
}

/// Errors that end a run.
///
/// A run either returns its final context or exactly one of these. The
/// [`History`](crate::History) passed to the runner keeps everything that
/// was recorded up to the failure.
///
/// # Non-Exhaustive
///
/// Match with a wildcard arm:
///
/// ```
/// use gears::GearError;
///
/// fn describe(error: &GearError) -> String {
///     match error {
///         GearError::Transform { gear, attempts, .. } => {
///             format!("{gear} gave up after {attempts} attempts")
///         }
///         GearError::Provider { model, .. } => format!("{model} is unavailable"),
///         GearError::Cancelled => "cancelled".to_string(),
///         other => other.to_string(),
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GearError {
    /// The initial context failed validation.
    #[error("Invalid context: {0}")]
    Validation(#[from] ValidationError),

    /// A gear's prompt template could not be rendered.
    #[error("Render failed in gear '{gear}': {source}")]
    Render {
        /// The gear whose template failed.
        gear: GearName,
        /// The template failure.
        source: TemplateError,
    },

    /// The model provider kept failing, or failed in a way retrying cannot fix.
    #[error("Provider call to '{model}' failed after {attempts} attempt(s): {source}")]
    Provider {
        /// Model the request was addressed to.
        model: String,
        /// Number of attempts made, including the first.
        attempts: u32,
        /// The last provider failure.
        source: ProviderError,
    },

    /// A gear could not interpret the model output within its retry budget.
    #[error("Transform failed in gear '{gear}' after {attempts} attempt(s): {details}")]
    Transform {
        /// The gear whose transform failed.
        gear: GearName,
        /// Number of whole-step attempts made.
        attempts: u32,
        /// The last transform failure.
        details: String,
    },

    /// A gear's `next` refused every successor.
    #[error("Routing failed in gear '{gear}': {details}")]
    Routing {
        /// The gear that could not choose a successor.
        gear: GearName,
        /// Reason given by the gear.
        details: String,
    },

    /// The run was cancelled from outside.
    #[error("Run cancelled")]
    Cancelled,

    /// The run executed more steps than the runner allows.
    #[error("Run exceeded the limit of {limit} steps")]
    MaxStepsExceeded {
        /// The configured ceiling.
        limit: usize,
    },

    /// A model or provider was configured with invalid values.
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl GearError {
    /// Returns `true` for [`GearError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GearError::Cancelled)
    }
}
