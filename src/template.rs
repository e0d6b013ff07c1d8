//! Prompt templates rendered from context data.
//!
//! Templates use Jinja syntax through [`minijinja`]: substitutions
//! (`{{ doc.title }}`), conditionals, loops and filters all work. The
//! serialized context is the template's global namespace, so struct fields
//! become variables. Referencing a variable the context does not define is
//! an error, never an empty string; `Option` fields serialize to `none` and
//! are always defined.
//!
//! ```
//! use gears::Template;
//! use serde_json::json;
//!
//! let template = Template::parse(
//!     "{% if retry %}Try again. {% endif %}Summarize: {{ doc.title | upper }}",
//! )?;
//! let text = template.render(&json!({"retry": null, "doc": {"title": "Gears"}}))?;
//! assert_eq!(text, "Summarize: GEARS");
//! # Ok::<(), gears::TemplateError>(())
//! ```

use crate::error::TemplateError;
use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use serde_json::Value;

const TEMPLATE_NAME: &str = "prompt";

/// A syntax-checked template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
}

impl Template {
    /// Checks `source` for syntax errors.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        environment()
            .template_from_named_str(TEMPLATE_NAME, source)
            .map_err(|e| TemplateError::Syntax(describe(&e)))?;
        Ok(Self {
            source: source.to_string(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Renders against `data`, usually a context's
    /// [`template_data`](crate::Context::template_data).
    pub fn render(&self, data: &Value) -> Result<String, TemplateError> {
        let env = environment();
        let template = env
            .template_from_named_str(TEMPLATE_NAME, &self.source)
            .map_err(|e| TemplateError::Syntax(describe(&e)))?;

        template.render(data).map_err(|e| match e.kind() {
            ErrorKind::UndefinedError => {
                let mut names: Vec<String> = template
                    .undeclared_variables(true)
                    .into_iter()
                    .filter(|name| lookup(data, name).is_none())
                    .collect();
                names.sort();
                TemplateError::UndefinedVariable(
                    names.into_iter().next().unwrap_or_else(|| describe(&e)),
                )
            }
            ErrorKind::SyntaxError => TemplateError::Syntax(describe(&e)),
            _ => TemplateError::Render(describe(&e)),
        })
    }
}

/// Parses and renders in one go.
pub fn render(source: &str, data: &Value) -> Result<String, TemplateError> {
    Template::parse(source)?.render(data)
}

fn environment<'source>() -> Environment<'source> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env
}

fn describe(error: &minijinja::Error) -> String {
    match (error.detail(), error.line()) {
        (Some(detail), Some(line)) => format!("{detail} (line {line})"),
        (Some(detail), None) => detail.to_string(),
        _ => error.to_string(),
    }
}

/// Resolves a dotted variable path such as `user.name` or `items.0`.
fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
