//! JSON query expressions
//!
//! A JSONata-compatible subset used for subscription `extract` rules and
//! `filter` conditions. Expressions are compiled once into an AST and
//! evaluated against `serde_json::Value` input.
//!
//! Evaluation returns `Ok(None)` when the result is undefined (for example a
//! path that does not exist in the input), which callers treat differently
//! from an explicit `null`.

mod cache;
mod eval;
mod functions;
mod lexer;
mod parser;

pub use cache::ExpressionCache;

use serde_json::Value;
use thiserror::Error;

/// Expression compilation and evaluation errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExpressionError {
    #[error("syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Returned for sources whose compilation already failed once
    #[error("invalid expression: {0}")]
    Invalid(String),
}

impl ExpressionError {
    pub(crate) fn syntax<S: Into<String>>(position: usize, message: S) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn evaluation<S: Into<String>>(message: S) -> Self {
        Self::Evaluation(message.into())
    }
}

/// A compiled expression
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    ast: parser::Node,
}

impl Expression {
    /// Parse `source` into an executable expression
    pub fn compile(source: &str) -> Result<Self, ExpressionError> {
        Ok(Self {
            source: source.to_string(),
            ast: parser::parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against `input`, which is also the `$$` root
    pub fn evaluate(&self, input: &Value) -> Result<Option<Value>, ExpressionError> {
        eval::evaluate(&self.ast, Some(input), input)
    }
}
