use crate::context::Context;
use crate::error::{TemplateError, TransformError};
use crate::message::MessageExtra;
use crate::model::{ModelCapability, ModelResponse};
use crate::template::Template;
use std::fmt;

/// Name of a gear, used in errors and logs.
///
/// ```
/// use gears::GearName;
///
/// let name: GearName = "Summarize".into();
/// assert_eq!(name.as_str(), "Summarize");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GearName(String);

impl GearName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Last path segment of a type name, generics stripped.
    pub fn from_type_name<T: ?Sized>() -> Self {
        let full_name = std::any::type_name::<T>();
        let base = full_name.split('<').next().unwrap_or(full_name);
        let short_name = base.rsplit("::").next().unwrap_or("UnknownGear");
        Self::new(short_name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GearName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GearName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for GearName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for GearName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for GearName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// What a gear decided after its transform.
pub enum Transition<C> {
    /// Run this gear next with the new context.
    Continue(Box<dyn Gear<C>>),
    /// Stop; the new context is the result of the run.
    Complete,
    /// Abort the run with [`GearError::Routing`](crate::GearError::Routing).
    Fail(String),
}

impl<C: Context> Transition<C> {
    pub fn next(gear: impl Gear<C> + 'static) -> Self {
        Self::Continue(Box::new(gear))
    }

    pub fn done() -> Self {
        Self::Complete
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail(reason.into())
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Transition::Continue(_))
    }
}

impl<C: Context> fmt::Debug for Transition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Continue(gear) => f.debug_tuple("Continue").field(&gear.name()).finish(),
            Transition::Complete => write!(f, "Complete"),
            Transition::Fail(reason) => f.debug_tuple("Fail").field(reason).finish(),
        }
    }
}

/// Per-gear settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GearConfig {
    /// Extra whole-step attempts after a failed transform. Default: 0.
    pub max_transform_retries: u32,
    /// Attributes added to this gear's user messages; they override
    /// runner-wide extras with the same key.
    pub message_extra: MessageExtra,
}

impl GearConfig {
    pub fn with_transform_retries(max_transform_retries: u32) -> Self {
        Self {
            max_transform_retries,
            ..Self::default()
        }
    }
}

/// One step of a chain: prompt in, structured context out, successor chosen.
///
/// A gear is bound to a model when it is built. The runner renders the
/// prompt, invokes the model, hands the reply to [`transform`](Gear::transform)
/// and asks [`next`](Gear::next) where to go. Successor gears are built on
/// demand inside `next`, so the chain is discovered while it runs.
///
/// When `transform` fails and the gear still has retry budget, the whole
/// step runs again (render, invoke, transform) against the same context.
///
/// `render`, `transform` and `next` should be pure functions of their
/// arguments.
///
/// # Examples
///
/// ```
/// use gears::prelude::*;
/// use serde::Serialize;
/// use std::sync::Arc;
///
/// #[derive(Debug, Serialize)]
/// struct Greeting {
///     name: String,
///     reply: Option<String>,
/// }
/// impl Context for Greeting {}
///
/// struct Greet {
///     model: Arc<dyn ModelCapability>,
/// }
///
/// impl Gear<Greeting> for Greet {
///     fn model(&self) -> &dyn ModelCapability {
///         self.model.as_ref()
///     }
///
///     fn template(&self) -> &str {
///         "Say hello to {{ name }}"
///     }
///
///     fn transform(
///         &self,
///         response: &ModelResponse,
///         context: &Greeting,
///     ) -> Result<Greeting, TransformError> {
///         Ok(Greeting {
///             name: context.name.clone(),
///             reply: Some(response.content.clone()),
///         })
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let gear = Greet { model: Arc::new(Echo::new()) };
/// let mut history = History::new();
/// let result = Runner::new()
///     .run(Greeting { name: "Ada".into(), reply: None }, &mut history, gear)
///     .await
///     .unwrap();
/// assert_eq!(result.reply.as_deref(), Some("Say hello to Ada"));
/// # });
/// ```
pub trait Gear<C>: Send + Sync {
    /// The model this gear talks to.
    fn model(&self) -> &dyn ModelCapability;

    /// Prompt template used by the default [`render`](Gear::render).
    fn template(&self) -> &str {
        ""
    }

    /// Builds the prompt for `context`.
    fn render(&self, context: &C) -> Result<String, TemplateError>
    where
        C: Context,
    {
        Template::parse(self.template())?.render(&context.template_data()?)
    }

    /// Turns the model reply into the next context.
    fn transform(&self, response: &ModelResponse, context: &C) -> Result<C, TransformError>;

    /// Picks the successor. Default: stop.
    fn next(&self, _context: &C) -> Transition<C> {
        Transition::Complete
    }

    fn config(&self) -> GearConfig {
        GearConfig::default()
    }

    /// Defaults to the implementing type's name.
    fn name(&self) -> GearName {
        GearName::from_type_name::<Self>()
    }

    /// Bump after changing the prompt or transform so cached steps from a
    /// [`StepCache`](crate::StepCache) are no longer reused.
    fn version(&self) -> u32 {
        0
    }
}

impl<C, G: Gear<C> + ?Sized> Gear<C> for Box<G> {
    fn model(&self) -> &dyn ModelCapability {
        (**self).model()
    }

    fn template(&self) -> &str {
        (**self).template()
    }

    fn render(&self, context: &C) -> Result<String, TemplateError>
    where
        C: Context,
    {
        (**self).render(context)
    }

    fn transform(&self, response: &ModelResponse, context: &C) -> Result<C, TransformError> {
        (**self).transform(response, context)
    }

    fn next(&self, context: &C) -> Transition<C> {
        (**self).next(context)
    }

    fn config(&self) -> GearConfig {
        (**self).config()
    }

    fn name(&self) -> GearName {
        (**self).name()
    }

    fn version(&self) -> u32 {
        (**self).version()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Echo;
    use serde::Serialize;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Note {
        text: String,
    }

    impl Context for Note {}

    struct Shout {
        model: Arc<dyn ModelCapability>,
    }

    impl Gear<Note> for Shout {
        fn model(&self) -> &dyn ModelCapability {
            self.model.as_ref()
        }

        fn template(&self) -> &str {
            "Shout: {{ text }}"
        }

        fn transform(&self, response: &ModelResponse, _context: &Note) -> Result<Note, TransformError> {
            Ok(Note {
                text: response.content.to_uppercase(),
            })
        }
    }

    struct Generic<T>(std::marker::PhantomData<T>);

    fn shout() -> Shout {
        Shout {
            model: Arc::new(Echo::new()),
        }
    }

    #[test]
    fn test_gear_name() {
        assert_eq!(shout().name(), GearName::new("Shout"));
        assert_eq!(GearName::from_type_name::<Generic<String>>(), "Generic");
    }

    #[test]
    fn test_default_render_uses_template() {
        let gear = shout();
        let ctx = Note {
            text: "hi".to_string(),
        };
        assert_eq!(gear.render(&ctx).unwrap(), "Shout: hi");
        // rendering twice gives the same prompt
        assert_eq!(gear.render(&ctx).unwrap(), gear.render(&ctx).unwrap());
    }

    #[test]
    fn test_transform_is_pure() {
        let gear = shout();
        let ctx = Note {
            text: "hi".to_string(),
        };
        let response = ModelResponse::assistant("quiet");
        let first = gear.transform(&response, &ctx).unwrap();
        let second = gear.transform(&response, &ctx).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.text, "QUIET");
    }

    #[test]
    fn test_default_next_is_terminal() {
        let gear = shout();
        let ctx = Note {
            text: String::new(),
        };
        assert!(gear.next(&ctx).is_terminal());
        assert!(matches!(gear.next(&ctx), Transition::Complete));
    }

    #[test]
    fn test_transition_debug() {
        let next: Transition<Note> = Transition::next(shout());
        assert_eq!(format!("{next:?}"), "Continue(GearName(\"Shout\"))");
        assert!(!next.is_terminal());
        let fail: Transition<Note> = Transition::fail("no branch");
        assert!(fail.is_terminal());
    }

    #[test]
    fn test_boxed_gear_forwards() {
        let boxed: Box<dyn Gear<Note>> = Box::new(shout());
        assert_eq!(boxed.name(), "Shout");
        assert_eq!(
            boxed
                .render(&Note {
                    text: "x".to_string()
                })
                .unwrap(),
            "Shout: x"
        );
        assert_eq!(boxed.version(), 0);
    }

    #[test]
    fn test_default_config() {
        let config = shout().config();
        assert_eq!(config.max_transform_retries, 0);
        assert!(config.message_extra.is_empty());
        assert_eq!(GearConfig::with_transform_retries(2).max_transform_retries, 2);
    }
}
