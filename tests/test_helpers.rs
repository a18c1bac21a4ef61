//! Test helpers and utilities for integration tests

use mqtt_http_bridge::store::MemoryStore;
use mqtt_http_bridge::subscription::{Subscription, SubscriptionService, SubscriptionTemplate};
use mqtt_http_bridge::template::TemplateCache;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Service over a fresh in-memory store
#[allow(dead_code)]
pub fn memory_service() -> Arc<SubscriptionService> {
    Arc::new(SubscriptionService::new(
        Arc::new(MemoryStore::new()),
        Arc::new(TemplateCache::new()),
    ))
}

/// Minimal valid subscription posting to `url`
#[allow(dead_code)]
pub fn subscription(name: &str, topic: &str, url: &str) -> Subscription {
    Subscription {
        name: name.to_string(),
        topic: topic.to_string(),
        method: "POST".to_string(),
        url: url.to_string(),
        ..Default::default()
    }
}

/// Button template parameterized by `instanceId`
#[allow(dead_code)]
pub fn button_template(url: &str) -> SubscriptionTemplate {
    SubscriptionTemplate {
        subscription: Subscription {
            name: "Button {{tpl.instanceId}}".to_string(),
            topic: "zigbee2mqtt/button-{{tpl.instanceId}}".to_string(),
            extract: BTreeMap::from([("action".to_string(), "action".to_string())]),
            filter: "extract.action = 'single'".to_string(),
            method: "POST".to_string(),
            url: url.to_string(),
            body_template: r#"{"button":"{{tpl.instanceId}}","action":"{{extract.action}}"}"#
                .to_string(),
            ..Default::default()
        },
        required_parameters: ["instanceId".to_string()].into_iter().collect(),
    }
}

/// `{"key": value}` parameter map
#[allow(dead_code)]
pub fn params(pairs: &[(&str, &str)]) -> serde_json::Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect()
}
