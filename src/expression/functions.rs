use super::eval::{to_boolean, to_number_value, to_text};
use super::ExpressionError;
use serde_json::Value;

/// Built-in functions callable as `$name(...)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    Exists,
    Not,
    Boolean,
    String,
    Number,
    Length,
    Lowercase,
    Uppercase,
    Contains,
    Count,
    Trim,
}

impl Function {
    pub(crate) fn lookup(name: &str) -> Option<Self> {
        let function = match name {
            "exists" => Function::Exists,
            "not" => Function::Not,
            "boolean" => Function::Boolean,
            "string" => Function::String,
            "number" => Function::Number,
            "length" => Function::Length,
            "lowercase" => Function::Lowercase,
            "uppercase" => Function::Uppercase,
            "contains" => Function::Contains,
            "count" => Function::Count,
            "trim" => Function::Trim,
            _ => return None,
        };
        Some(function)
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Function::Exists => "exists",
            Function::Not => "not",
            Function::Boolean => "boolean",
            Function::String => "string",
            Function::Number => "number",
            Function::Length => "length",
            Function::Lowercase => "lowercase",
            Function::Uppercase => "uppercase",
            Function::Contains => "contains",
            Function::Count => "count",
            Function::Trim => "trim",
        }
    }

    /// Inclusive (min, max) argument counts
    pub(crate) fn arity(self) -> (usize, usize) {
        match self {
            Function::Contains => (2, 2),
            _ => (1, 1),
        }
    }

    /// Apply to already evaluated arguments; `None` entries are undefined
    pub(crate) fn apply(self, args: &[Option<Value>]) -> Result<Option<Value>, ExpressionError> {
        let first = args.first().cloned().flatten();

        match self {
            Function::Exists => Ok(Some(Value::Bool(first.is_some()))),
            Function::Not => Ok(first.map(|v| Value::Bool(!to_boolean(&v)))),
            Function::Boolean => Ok(first.map(|v| Value::Bool(to_boolean(&v)))),
            Function::String => Ok(first.map(|v| Value::String(to_text(&v)))),
            Function::Number => match first {
                None => Ok(None),
                Some(Value::Number(n)) => Ok(Some(Value::Number(n))),
                Some(Value::Bool(b)) => Ok(Some(Value::from(u8::from(b)))),
                Some(Value::String(s)) => {
                    let parsed = s.trim().parse::<f64>().map_err(|_| {
                        ExpressionError::evaluation(format!(
                            "unable to cast \"{s}\" to a number"
                        ))
                    })?;
                    to_number_value(parsed).map(Some)
                }
                Some(other) => Err(ExpressionError::evaluation(format!(
                    "unable to cast {other} to a number"
                ))),
            },
            Function::Length => self.string_arg(first).map(|s| {
                s.map(|s| Value::from(s.chars().count() as u64))
            }),
            Function::Lowercase => self
                .string_arg(first)
                .map(|s| s.map(|s| Value::String(s.to_lowercase()))),
            Function::Uppercase => self
                .string_arg(first)
                .map(|s| s.map(|s| Value::String(s.to_uppercase()))),
            Function::Trim => self.string_arg(first).map(|s| {
                s.map(|s| Value::String(s.split_whitespace().collect::<Vec<_>>().join(" ")))
            }),
            Function::Contains => {
                let Some(haystack) = self.string_arg(first)? else {
                    return Ok(None);
                };
                let needle = self
                    .string_arg(args.get(1).cloned().flatten())?
                    .unwrap_or_default();
                Ok(Some(Value::Bool(haystack.contains(&needle))))
            }
            Function::Count => Ok(Some(Value::from(match first {
                None => 0,
                Some(Value::Array(items)) => items.len() as u64,
                Some(_) => 1,
            }))),
        }
    }

    fn string_arg(self, value: Option<Value>) -> Result<Option<String>, ExpressionError> {
        match value {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(ExpressionError::evaluation(format!(
                "argument of ${} must be a string, got {other}",
                self.name()
            ))),
        }
    }
}
