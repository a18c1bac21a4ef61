//! Text templates for subscription fields and webhook bodies
//!
//! Sources use `{{ dotted.path }}` placeholders. Rendering is two-pass:
//! placeholders are first resolved against the data (missing paths are
//! injected with their own placeholder text), then the rewritten source is
//! executed by the template engine. Only syntax errors fail a render.
//!
//! ```
//! use mqtt_http_bridge::template::TemplateCache;
//! use serde_json::json;
//!
//! let cache = TemplateCache::new();
//! let out = cache
//!     .render_inline("{{ meta.topic }} {{ global.unset }}", &json!({"meta": {"topic": "a/b"}}))
//!     .unwrap();
//! assert_eq!(out, "a/b {{ global.unset }}");
//! ```

mod cache;
mod inline;

pub use cache::TemplateCache;

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template syntax error: {0}")]
    Syntax(String),

    #[error("template render error: {0}")]
    Render(String),
}

/// Render `source` against `params` with a throwaway cache
pub fn render_inline(source: &str, params: &Value) -> Result<String, TemplateError> {
    TemplateCache::new().render_inline(source, params)
}

/// Whether `source` contains any placeholder or block syntax
pub fn has_template_syntax(source: &str) -> bool {
    inline::has_template_syntax(source)
}

/// Check that `source` would compile, without rendering it
pub fn validate_template(source: &str) -> Result<(), TemplateError> {
    if !inline::has_template_syntax(source) {
        return Ok(());
    }
    let prepared = inline::prepare(source, &Value::Object(Default::default()));
    let env = cache::build_environment();
    env.template_from_str(&prepared.source)
        .map(|_| ())
        .map_err(|e| TemplateError::Syntax(e.to_string()))
}
