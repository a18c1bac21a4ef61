//! Request bodies accepted by the HTTP API and their validation

use crate::subscription::{Subscription, SubscriptionTemplate};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const ALLOWED_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

/// Body of subscription create/update requests
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub extract: BTreeMap<String, String>,
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, alias = "bodyTemplate")]
    pub body: String,
    /// On update: replace the subscription with a fresh instance of this template
    pub subscription_template_id: Option<String>,
    #[serde(default)]
    pub subscription_template_parameters: Map<String, Value>,
}

impl SubscriptionRequest {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        require(&mut errors, "name", &self.name);
        require(&mut errors, "topic", &self.topic);
        require_method(&mut errors, &self.method);
        require(&mut errors, "url", &self.url);
        finish(errors)
    }

    pub fn into_subscription(self, id: String) -> Subscription {
        Subscription {
            id,
            name: self.name,
            topic: self.topic,
            extract: self.extract,
            filter: self.filter,
            method: self.method,
            url: self.url,
            headers: self.headers,
            body_template: self.body,
            template_id: None,
            template_parameters: Map::new(),
        }
    }
}

/// Body of subscription template create/update requests
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionTemplateRequest {
    #[serde(flatten)]
    pub fields: SubscriptionRequest,
    pub required_parameters: Option<Vec<String>>,
}

impl SubscriptionTemplateRequest {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = match self.fields.validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };
        if self.required_parameters.is_none() {
            errors.push(blank("requiredParameters"));
        }
        finish(errors)
    }

    pub fn into_template(self, id: String) -> SubscriptionTemplate {
        let required_parameters = self
            .required_parameters
            .unwrap_or_default()
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        SubscriptionTemplate {
            subscription: self.fields.into_subscription(id),
            required_parameters,
        }
    }
}

/// Body of `POST /subscription-templates/{id}/subscriptions`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstantiateRequest {
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalParameterRequest {
    #[serde(default)]
    pub parameter: String,
    #[serde(default)]
    pub value: String,
}

impl GlobalParameterRequest {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        require(&mut errors, "parameter", &self.parameter);
        require(&mut errors, "value", &self.value);
        finish(errors)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationType {
    Jsonata,
    Template,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidationRequest {
    #[serde(rename = "type")]
    pub validation_type: ValidationType,
    #[serde(default)]
    pub subject: String,
}

fn blank(field: &str) -> String {
    format!("Field '{field}' cannot be blank")
}

fn require(errors: &mut Vec<String>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(blank(field));
    }
}

fn require_method(errors: &mut Vec<String>, method: &str) {
    if method.trim().is_empty() {
        errors.push(blank("method"));
    } else if !ALLOWED_METHODS.contains(&method) {
        errors.push(format!(
            "Field 'method' must be one of {}",
            ALLOWED_METHODS.join(" ")
        ));
    }
}

fn finish(errors: Vec<String>) -> Result<(), Vec<String>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscription_request_validation() {
        let request: SubscriptionRequest = serde_json::from_value(json!({
            "name": "Button",
            "topic": "zigbee2mqtt/button",
            "method": "POST",
            "url": "http://localhost/hook",
            "body": "{{ meta.payload }}"
        }))
        .unwrap();
        assert!(request.validate().is_ok());

        let sub = request.into_subscription("abc".into());
        assert_eq!(sub.id, "abc");
        assert_eq!(sub.body_template, "{{ meta.payload }}");
    }

    #[test]
    fn test_validation_lists_every_problem() {
        let request: SubscriptionRequest =
            serde_json::from_value(json!({"method": "TRACE"})).unwrap();
        let errors = request.validate().unwrap_err();
        assert_eq!(
            errors,
            vec![
                "Field 'name' cannot be blank",
                "Field 'topic' cannot be blank",
                "Field 'method' must be one of GET POST PUT PATCH DELETE",
                "Field 'url' cannot be blank",
            ]
        );
    }

    #[test]
    fn test_template_request_requires_parameter_list() {
        let request: SubscriptionTemplateRequest = serde_json::from_value(json!({
            "name": "Button {{tpl.id}}",
            "topic": "buttons/{{tpl.id}}",
            "method": "POST",
            "url": "http://localhost/hook",
            "bodyTemplate": "{}"
        }))
        .unwrap();
        assert_eq!(
            request.validate().unwrap_err(),
            vec!["Field 'requiredParameters' cannot be blank"]
        );

        let mut request = request;
        request.required_parameters = Some(vec!["id".into(), " ".into()]);
        assert!(request.validate().is_ok());
        let template = request.into_template("t1".into());
        assert_eq!(template.subscription.body_template, "{}");
        assert_eq!(template.required_parameters.len(), 1);
    }

    #[test]
    fn test_validation_type_parsing() {
        let request: ValidationRequest =
            serde_json::from_value(json!({"type": "jsonata", "subject": "a = 1"})).unwrap();
        assert_eq!(request.validation_type, ValidationType::Jsonata);
        assert!(serde_json::from_value::<ValidationRequest>(json!({"type": "xml"})).is_err());
    }
}
