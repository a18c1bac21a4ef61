//! Placeholder preparation for inline templates
//!
//! `{{ dotted.path }}` placeholders are rewritten into explicit subscript
//! lookups on a single root variable. Paths missing from the data are
//! injected with the placeholder's own text so they render back to
//! themselves.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Root variable the rewritten placeholders read from
pub(crate) const ROOT: &str = "ctx";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{(\s*[a-zA-Z0-9_.]+\s*)\}\}").expect("placeholder pattern is valid")
});

/// Rewritten template source plus the data it must be rendered against
#[derive(Debug)]
pub(crate) struct Prepared {
    pub source: String,
    pub data: Value,
}

/// True when `source` contains anything the template engine would interpret
pub(crate) fn has_template_syntax(source: &str) -> bool {
    source.contains("{{") || source.contains("{%") || source.contains("{#")
}

pub(crate) fn prepare(source: &str, params: &Value) -> Prepared {
    let mut data = params.clone();
    let mut out = String::with_capacity(source.len() + 16);
    let mut cursor = 0;

    for captures in PLACEHOLDER.captures_iter(source) {
        let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let (mut start, mut end) = (whole.start(), whole.end());

        let path = inner.as_str().trim();
        let path = path.strip_prefix('.').unwrap_or(path);
        let segments: Vec<&str> = path.split('.').collect();

        let replacement = if path.is_empty() || segments.iter().any(|s| s.is_empty()) {
            literal(whole.as_str())
        } else if lookup(&data, &segments).is_none()
            && !inject(&mut data, &segments, Value::String(whole.as_str().to_string()))
        {
            literal(whole.as_str())
        } else {
            // The opening quote may already belong to the previous replacement
            if start > cursor
                && is_quoted_slot(source, start, end)
                && lookup(&data, &segments).is_some_and(is_bare_json)
            {
                start -= 1;
                end += 1;
            }
            format!("{{{{ {} }}}}", accessor(&data, &segments))
        };

        out.push_str(&source[cursor..start]);
        out.push_str(&replacement);
        cursor = end;
    }
    out.push_str(&source[cursor..]);

    Prepared { source: out, data }
}

/// Structural lookup of a dotted path; numeric segments index arrays
pub(crate) fn lookup<'a>(data: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments.iter().try_fold(data, |current, segment| match current {
        Value::Object(map) => map.get(*segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Create `segments` inside `data`, adding intermediate objects as needed.
/// Returns false when an intermediate value cannot hold children.
fn inject(data: &mut Value, segments: &[&str], value: Value) -> bool {
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };

    let mut current = data;
    for segment in parents {
        current = match current {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                match segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                    Some(item) => item,
                    None => return false,
                }
            }
            _ => return false,
        };
    }

    match current {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            true
        }
        _ => false,
    }
}

/// `ctx["a"]["b"][0]`, choosing integer subscripts where the data holds an array
fn accessor(data: &Value, segments: &[&str]) -> String {
    let mut expr = String::from(ROOT);
    let mut current = Some(data);
    for segment in segments {
        let index = match current {
            Some(Value::Array(_)) => segment.parse::<usize>().ok(),
            _ => None,
        };
        match index {
            Some(i) => expr.push_str(&format!("[{i}]")),
            None => expr.push_str(&format!("[\"{segment}\"]")),
        }
        current = current.and_then(|value| lookup(value, &[*segment]));
    }
    expr
}

fn is_quoted_slot(source: &str, start: usize, end: usize) -> bool {
    source[..start].ends_with('"') && source[end..].starts_with('"')
}

/// Values whose JSON form needs no quotes
fn is_bare_json(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Number(_) | Value::Null)
}

fn literal(text: &str) -> String {
    format!("{{% raw %}}{text}{{% endraw %}}")
}
