use super::inline;
use super::TemplateError;
use crate::cache_key::content_hash;
use minijinja::value::ValueKind;
use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::RwLock;
use tracing::warn;

struct Inner {
    env: Environment<'static>,
    /// `None` marks a compiled template, `Some` holds the compile error
    entries: HashMap<String, Option<String>>,
}

/// Memoizes compiled text templates by content hash
pub struct TemplateCache {
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("entries", &self.len())
            .finish()
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn build_environment() -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Chainable);
    env.set_keep_trailing_newline(true);
    // JSON spelling for the scalars the engine would otherwise print Python-style
    env.set_formatter(|out, state, value| {
        let literal = match value.kind() {
            ValueKind::None => "null",
            ValueKind::Bool if value.is_true() => "true",
            ValueKind::Bool => "false",
            _ => return minijinja::escape_formatter(out, state, value),
        };
        out.write_str(literal)
            .map_err(|_| minijinja::Error::new(ErrorKind::WriteFailure, "failed to write output"))
    });
    env
}

impl TemplateCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                env: build_environment(),
                entries: HashMap::new(),
            }),
        }
    }

    /// Render a prepared template source against `data`.
    ///
    /// An empty source is the pass-through template and yields `Ok(None)`.
    pub fn render(&self, source: &str, data: &Value) -> Result<Option<String>, TemplateError> {
        if source.is_empty() {
            return Ok(None);
        }

        let key = content_hash(source);
        self.ensure_compiled(&key, source)?;

        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let template = inner
            .env
            .get_template(&key)
            .map_err(|e| TemplateError::Render(e.to_string()))?;
        let ctx = minijinja::context! { ctx => minijinja::Value::from_serialize(data) };
        template
            .render(ctx)
            .map(Some)
            .map_err(|e| TemplateError::Render(e.to_string()))
    }

    /// Two-pass placeholder rendering; see [`crate::template::render_inline`]
    pub fn render_inline(&self, source: &str, params: &Value) -> Result<String, TemplateError> {
        if !inline::has_template_syntax(source) {
            return Ok(source.to_string());
        }

        let prepared = inline::prepare(source, params);
        Ok(self
            .render(&prepared.source, &prepared.data)?
            .unwrap_or_default())
    }

    /// Like [`TemplateCache::render_inline`], but the source is compiled for
    /// this call only. Used for sources that already carry message data, so
    /// the cache does not grow with traffic.
    pub fn render_inline_once(&self, source: &str, params: &Value) -> Result<String, TemplateError> {
        if !inline::has_template_syntax(source) {
            return Ok(source.to_string());
        }

        let prepared = inline::prepare(source, params);
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let ctx = minijinja::context! { ctx => minijinja::Value::from_serialize(&prepared.data) };
        inner
            .env
            .render_str(&prepared.source, ctx)
            .map_err(|e| match e.kind() {
                ErrorKind::SyntaxError => TemplateError::Syntax(e.to_string()),
                _ => TemplateError::Render(e.to_string()),
            })
    }

    fn ensure_compiled(&self, key: &str, source: &str) -> Result<(), TemplateError> {
        {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            match inner.entries.get(key) {
                Some(None) => return Ok(()),
                Some(Some(message)) => return Err(TemplateError::Syntax(message.clone())),
                None => {}
            }
        }

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match inner.entries.get(key) {
            Some(None) => return Ok(()),
            Some(Some(message)) => return Err(TemplateError::Syntax(message.clone())),
            None => {}
        }

        match inner
            .env
            .add_template_owned(key.to_string(), source.to_string())
        {
            Ok(()) => {
                inner.entries.insert(key.to_string(), None);
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                warn!(template = source, error = %message, "Failed to compile template");
                inner.entries.insert(key.to_string(), Some(message.clone()));
                Err(TemplateError::Syntax(message))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
