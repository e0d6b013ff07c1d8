use crate::error::{TemplateError, ValidationError};
use serde::Serialize;

/// Workflow state carried from one gear to the next.
///
/// A context is a plain typed record. Gears never mutate it: each
/// [`transform`](crate::Gear::transform) builds a new value from the
/// previous one. The runner calls [`validate`](Context::validate) on the
/// initial value and on every transformed value, so constraints placed here
/// hold at every step boundary.
///
/// Templates see the serialized form of the context, so field names become
/// template variables.
///
/// # Examples
///
/// ```
/// use gears::{Context, ValidationError};
/// use serde::Serialize;
///
/// #[derive(Debug, Serialize)]
/// struct Article {
///     title: String,
///     summary: Option<String>,
/// }
///
/// impl Context for Article {
///     fn validate(&self) -> Result<(), ValidationError> {
///         if self.title.trim().is_empty() {
///             return Err(ValidationError::missing("title"));
///         }
///         Ok(())
///     }
/// }
///
/// let article = Article { title: String::new(), summary: None };
/// assert!(article.validate().is_err());
/// ```
pub trait Context: Serialize + Send + Sync + 'static {
    /// Checks the record's constraints. Default accepts everything.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Returns the value templates are rendered against.
    fn template_data(&self) -> Result<serde_json::Value, TemplateError> {
        serde_json::to_value(self).map_err(|e| TemplateError::Context(e.to_string()))
    }
}

/// Validates a freshly built context, handing it back on success.
///
/// Convenient at the end of a transform:
///
/// ```
/// use gears::{validated, Context, TransformError};
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Count(u32);
/// impl Context for Count {}
///
/// fn parse(text: &str) -> Result<Count, TransformError> {
///     let n = text.trim().parse().map_err(|_| TransformError::new("not a number"))?;
///     Ok(validated(Count(n))?)
/// }
///
/// assert_eq!(parse(" 7 ").map(|c| c.0), Ok(7));
/// ```
pub fn validated<C: Context>(context: C) -> Result<C, ValidationError> {
    context.validate()?;
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize)]
    struct Person {
        name: String,
        age: u32,
    }

    impl Context for Person {
        fn validate(&self) -> Result<(), ValidationError> {
            if self.name.is_empty() {
                return Err(ValidationError::missing("name"));
            }
            if self.age > 150 {
                return Err(ValidationError::invalid("age", "must be at most 150"));
            }
            Ok(())
        }
    }

    #[derive(Debug, Serialize)]
    struct Anything {
        note: String,
    }

    impl Context for Anything {}

    #[test]
    fn test_validation() {
        let ok = Person {
            name: "Ada".to_string(),
            age: 36,
        };
        assert!(ok.validate().is_ok());

        let missing = Person {
            name: String::new(),
            age: 36,
        };
        assert_eq!(missing.validate(), Err(ValidationError::missing("name")));

        let too_old = Person {
            name: "Methuselah".to_string(),
            age: 969,
        };
        assert_eq!(
            too_old.validate().map_err(|e| e.field),
            Err(Some("age".to_string()))
        );
    }

    #[test]
    fn test_default_validation_accepts() {
        let ctx = Anything {
            note: String::new(),
        };
        assert!(ctx.validate().is_ok());
    }

    #[test]
    fn test_template_data() {
        let ctx = Person {
            name: "Ada".to_string(),
            age: 36,
        };
        let data = ctx.template_data().unwrap();
        assert_eq!(data["name"], "Ada");
        assert_eq!(data["age"], 36);
    }

    #[test]
    fn test_validated_passes_value_through() {
        let ctx = validated(Person {
            name: "Grace".to_string(),
            age: 85,
        })
        .unwrap();
        assert_eq!(ctx.name, "Grace");

        let err = validated(Person {
            name: String::new(),
            age: 1,
        });
        assert!(err.is_err());
    }
}
