//! Payload templates.
//!
//! Templates extract a derived value from a raw MQTT payload, e.g. the caller id
//! out of a JSON status message, or normalise a payload before it is compared
//! against the configured state literals:
//!
//! ```text
//! {{ value_json.callerid }}
//! {{ value_json['state'] | lower }}
//! {"dial": "{{ value }}"}
//! ```
//!
//! The payload is available as `value`; when it parses as JSON it is also
//! available as `value_json`.

mod parser;

use std::fmt;
use std::str::FromStr;

use chumsky::Parser;
use serde::Deserialize;

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "String")]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
    uses_json: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Expr {
    pub base: Primary,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Primary {
    Literal(String),
    Value,
    ValueJson(Vec<Accessor>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Accessor {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Filter {
    Default(String),
    Trim,
    Upper,
    Lower,
    Replace(String, String),
}

impl Filter {
    fn from_call(name: &str, args: Vec<String>) -> Result<Self, String> {
        let expect_args = |n: usize| {
            if args.len() == n {
                Ok(())
            } else {
                Err(format!(
                    "filter '{}' takes {} argument(s), got {}",
                    name,
                    n,
                    args.len()
                ))
            }
        };

        match name {
            "default" | "d" => {
                expect_args(1)?;
                Ok(Filter::Default(args[0].clone()))
            }
            "trim" => expect_args(0).map(|_| Filter::Trim),
            "upper" => expect_args(0).map(|_| Filter::Upper),
            "lower" => expect_args(0).map(|_| Filter::Lower),
            "replace" => {
                expect_args(2)?;
                Ok(Filter::Replace(args[0].clone(), args[1].clone()))
            }
            other => Err(format!("unknown filter '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("invalid template '{template}': {message}")]
    Parse { template: String, message: String },

    #[error("payload is not valid JSON, 'value_json' is undefined")]
    NotJson,

    #[error("cannot access '{member}' of an undefined value")]
    UndefinedMember { member: String },
}

/// Result of evaluating an expression. `None` is an undefined value.
type Evaluated = Option<serde_json::Value>;

impl Template {
    /// Parse a template from its source text.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let segments = parser::template_parser()
            .parse(source)
            .into_result()
            .map_err(|errs| TemplateError::Parse {
                template: source.to_string(),
                message: errs
                    .iter()
                    .map(|e| format!("{} at {:?}", e, e.span()))
                    .collect::<Vec<_>>()
                    .join("; "),
            })?;

        let uses_json = segments.iter().any(|segment| {
            matches!(
                segment,
                Segment::Expr(Expr {
                    base: Primary::ValueJson(_),
                    ..
                })
            )
        });

        Ok(Self {
            source: source.to_string(),
            segments,
            uses_json,
        })
    }

    /// The template's source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render the template against a raw payload.
    pub fn render(&self, value: &str) -> Result<String, TemplateError> {
        let value_json = if self.uses_json {
            serde_json::from_str::<serde_json::Value>(value).ok()
        } else {
            None
        };

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Expr(expr) => {
                    let evaluated = eval(expr, value, value_json.as_ref())?;
                    out.push_str(&to_text(evaluated.as_ref()));
                }
            }
        }
        Ok(out)
    }

    /// Render the template, falling back to the raw payload if rendering fails.
    pub fn render_with_possible_json_value(&self, value: &str) -> String {
        match self.render(value) {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::debug!(
                    "Template '{}' failed on payload {:?}: {}",
                    self.source,
                    value,
                    e
                );
                value.to_string()
            }
        }
    }
}

fn eval(
    expr: &Expr,
    value: &str,
    value_json: Option<&serde_json::Value>,
) -> Result<Evaluated, TemplateError> {
    let mut current = match &expr.base {
        Primary::Literal(s) => Some(serde_json::Value::String(s.clone())),
        Primary::Value => Some(serde_json::Value::String(value.to_string())),
        Primary::ValueJson(path) => {
            let root = value_json.ok_or(TemplateError::NotJson)?;
            lookup(root, path)?
        }
    };

    for filter in &expr.filters {
        current = apply_filter(filter, current);
    }

    Ok(current)
}

fn lookup(root: &serde_json::Value, path: &[Accessor]) -> Result<Evaluated, TemplateError> {
    let mut current = Some(root);
    for accessor in path {
        let value = current.ok_or_else(|| TemplateError::UndefinedMember {
            member: match accessor {
                Accessor::Key(key) => key.clone(),
                Accessor::Index(i) => i.to_string(),
            },
        })?;
        current = match accessor {
            Accessor::Key(key) => value.get(key.as_str()),
            Accessor::Index(i) => value.get(*i),
        };
    }
    Ok(current.cloned())
}

fn apply_filter(filter: &Filter, input: Evaluated) -> Evaluated {
    let as_text = |v: &Evaluated| to_text(v.as_ref());
    let text = |s: String| Some(serde_json::Value::String(s));

    match filter {
        Filter::Default(fallback) => input.or_else(|| text(fallback.clone())),
        Filter::Trim => text(as_text(&input).trim().to_string()),
        Filter::Upper => text(as_text(&input).to_uppercase()),
        Filter::Lower => text(as_text(&input).to_lowercase()),
        Filter::Replace(from, to) => text(as_text(&input).replace(from.as_str(), to)),
    }
}

/// Render an evaluated value as text.
fn to_text(value: Option<&serde_json::Value>) -> String {
    match value {
        None => String::new(),
        Some(serde_json::Value::Null) => "None".to_string(),
        Some(serde_json::Value::Bool(true)) => "True".to_string(),
        Some(serde_json::Value::Bool(false)) => "False".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

impl TryFrom<String> for Template {
    type Error = TemplateError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Template::parse(&source)
    }
}

impl FromStr for Template {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Template::parse(s)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}
