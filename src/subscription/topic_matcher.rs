use regex::Regex;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::warn;

/// Matches concrete MQTT topics against subscription topic filters.
///
/// `+` matches one or more characters within a single level, `#` matches one
/// or more characters across levels. Filters are compiled once per distinct
/// filter string; a filter that fails to compile never matches.
#[derive(Debug, Default)]
pub struct TopicMatcher {
    compiled: RwLock<HashMap<String, Option<Regex>>>,
}

impl TopicMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn matches(&self, topic: &str, filter: &str) -> bool {
        if topic == filter {
            return true;
        }

        if !has_wildcard(filter) {
            return false;
        }

        if let Some(entry) = self
            .compiled
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(filter)
        {
            return entry.as_ref().is_some_and(|re| re.is_match(topic));
        }

        let compiled = compile_filter(filter);
        let matched = compiled.as_ref().is_some_and(|re| re.is_match(topic));
        self.compiled
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(filter.to_string(), compiled);
        matched
    }

    /// Drop every compiled filter
    pub fn reset(&self) {
        self.compiled
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

fn has_wildcard(filter: &str) -> bool {
    filter.contains('+') || filter.contains('#')
}

fn compile_filter(filter: &str) -> Option<Regex> {
    let mut pattern = String::from("(?s)^");
    for c in filter.chars() {
        match c {
            '+' => pattern.push_str("[^/]+"),
            '#' => pattern.push_str(".+"),
            other => pattern.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    pattern.push('$');

    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(filter, error = %e, "Failed to compile topic filter");
            None
        }
    }
}
