use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// A routing rule from an MQTT topic filter to an HTTP webhook.
///
/// Fields other than `id`, `extract`, `template_id` and
/// `template_parameters` may contain `{{ path }}` placeholders. The stored
/// value is always the literal, un-hydrated text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub topic: String,
    /// Output name to JSON query expression evaluated against the payload
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extract: BTreeMap<String, String>,
    /// JSON query expression; empty always passes
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub filter: String,
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Empty forwards the inbound payload unchanged
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub template_parameters: Map<String, Value>,
}

/// A parameterized subscription blueprint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionTemplate {
    #[serde(flatten)]
    pub subscription: Subscription,
    #[serde(default)]
    pub required_parameters: BTreeSet<String>,
}

impl SubscriptionTemplate {
    pub fn id(&self) -> &str {
        &self.subscription.id
    }

    /// Names from `required_parameters` absent in `parameters`, in sorted order
    pub fn missing_parameters(&self, parameters: &Map<String, Value>) -> Vec<String> {
        self.required_parameters
            .iter()
            .filter(|name| !parameters.contains_key(name.as_str()))
            .cloned()
            .collect()
    }

    /// Literal copy of this template's fields for a new derived subscription
    pub fn instantiate(&self, parameters: Map<String, Value>) -> Subscription {
        let source = &self.subscription;
        Subscription {
            id: String::new(),
            name: source.name.clone(),
            topic: source.topic.clone(),
            extract: source.extract.clone(),
            filter: source.filter.clone(),
            method: source.method.clone(),
            url: source.url.clone(),
            headers: source.headers.clone(),
            body_template: source.body_template.clone(),
            template_id: Some(source.id.clone()),
            template_parameters: parameters,
        }
    }

    /// Re-apply the shared fields onto a derived subscription, keeping its
    /// identity and instantiation parameters
    pub fn propagate_to(&self, derived: &mut Subscription) {
        let source = &self.subscription;
        derived.name = source.name.clone();
        derived.topic = source.topic.clone();
        derived.extract = source.extract.clone();
        derived.filter = source.filter.clone();
        derived.method = source.method.clone();
        derived.url = source.url.clone();
        derived.headers = source.headers.clone();
        derived.body_template = source.body_template.clone();
    }
}

/// Sort key used for deterministic listings
pub(crate) fn by_name_then_id(a: &Subscription, b: &Subscription) -> std::cmp::Ordering {
    a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template() -> SubscriptionTemplate {
        SubscriptionTemplate {
            subscription: Subscription {
                id: "tmpl1".into(),
                name: "Button {{tpl.instanceId}}".into(),
                topic: "zigbee2mqtt/button-{{tpl.instanceId}}".into(),
                filter: "extract.action = 'single'".into(),
                method: "POST".into(),
                url: "https://example.com/hook".into(),
                ..Default::default()
            },
            required_parameters: ["instanceId".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn test_instantiate_copies_filter_and_links_template() {
        let mut params = Map::new();
        params.insert("instanceId".into(), json!("001"));

        let derived = template().instantiate(params.clone());
        assert_eq!(derived.id, "");
        assert_eq!(derived.topic, "zigbee2mqtt/button-{{tpl.instanceId}}");
        assert_eq!(derived.filter, "extract.action = 'single'");
        assert_eq!(derived.template_id.as_deref(), Some("tmpl1"));
        assert_eq!(derived.template_parameters, params);
    }

    #[test]
    fn test_missing_parameters() {
        let mut tmpl = template();
        tmpl.required_parameters.insert("room".into());

        let mut params = Map::new();
        params.insert("room".into(), json!("kitchen"));
        assert_eq!(tmpl.missing_parameters(&params), vec!["instanceId"]);
        assert_eq!(
            tmpl.missing_parameters(&Map::new()),
            vec!["instanceId", "room"]
        );
    }

    #[test]
    fn test_propagate_keeps_identity() {
        let tmpl = template();
        let mut derived = Subscription {
            id: "sub1".into(),
            topic: "old".into(),
            template_id: Some("tmpl1".into()),
            ..Default::default()
        };
        derived.template_parameters.insert("instanceId".into(), json!("7"));

        tmpl.propagate_to(&mut derived);
        assert_eq!(derived.id, "sub1");
        assert_eq!(derived.topic, tmpl.subscription.topic);
        assert_eq!(derived.template_parameters["instanceId"], json!("7"));
    }

    #[test]
    fn test_serialization_uses_camel_case() {
        let mut sub = template().instantiate(Map::new());
        sub.body_template = "{}".into();
        let value = serde_json::to_value(&sub).unwrap();
        assert_eq!(value["bodyTemplate"], json!("{}"));
        assert_eq!(value["templateId"], json!("tmpl1"));
        assert!(value.get("headers").is_none());

        let tmpl_value = serde_json::to_value(template()).unwrap();
        assert_eq!(tmpl_value["requiredParameters"], json!(["instanceId"]));
        assert_eq!(tmpl_value["id"], json!("tmpl1"));
    }
}
