use super::{Expression, ExpressionError};
use crate::cache_key::content_hash;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::warn;

#[derive(Debug, Clone)]
enum Entry {
    Compiled(Arc<Expression>),
    Invalid(String),
}

/// Memoizes compiled expressions by content hash
///
/// Sources that fail to compile are cached as invalid so the failure is
/// logged once and later lookups fail without recompiling.
#[derive(Debug, Default)]
pub struct ExpressionCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiled expression for `source`, compiling on first use
    pub fn get(&self, source: &str) -> Result<Arc<Expression>, ExpressionError> {
        let key = content_hash(source);

        if let Some(entry) = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
        {
            return entry_result(entry);
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        // Another writer may have compiled it between the two locks
        if let Some(entry) = entries.get(&key) {
            return entry_result(entry);
        }

        match Expression::compile(source) {
            Ok(expression) => {
                let expression = Arc::new(expression);
                entries.insert(key, Entry::Compiled(Arc::clone(&expression)));
                Ok(expression)
            }
            Err(err) => {
                warn!(expression = source, error = %err, "Failed to compile expression");
                let message = err.to_string();
                entries.insert(key, Entry::Invalid(message));
                Err(err)
            }
        }
    }

    /// Compile (or reuse) and evaluate `source` against `input`
    pub fn evaluate(&self, source: &str, input: &Value) -> Result<Option<Value>, ExpressionError> {
        self.get(source)?.evaluate(input)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn entry_result(entry: &Entry) -> Result<Arc<Expression>, ExpressionError> {
    match entry {
        Entry::Compiled(expression) => Ok(Arc::clone(expression)),
        Entry::Invalid(message) => Err(ExpressionError::Invalid(message.clone())),
    }
}
