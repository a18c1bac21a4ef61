//! Inbound message pipeline
//!
//! For every inbound message the [`Processor`] resolves the matching
//! subscriptions, then handles each one on its own task:
//! extract, hydrate, filter, render, publish. A failure in one subscription
//! never affects its siblings or later messages.

use crate::expression::{Expression, ExpressionCache};
use crate::message_log::MessageLog;
use crate::observability::metrics::metrics;
use crate::publisher::Publisher;
use crate::subscription::{Subscription, SubscriptionService};
use crate::template::{self, TemplateCache};
use bytes::Bytes;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

/// A message received from a broker
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    /// Identity of the broker connection the message arrived on
    pub client: String,
    pub payload: Bytes,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, client: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            client: client.into(),
            payload: payload.into(),
        }
    }

    fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

pub struct Processor {
    service: Arc<SubscriptionService>,
    publisher: Arc<dyn Publisher>,
    expressions: Arc<ExpressionCache>,
    message_log: Option<Arc<MessageLog>>,
}

impl Processor {
    pub fn new(
        service: Arc<SubscriptionService>,
        publisher: Arc<dyn Publisher>,
        expressions: Arc<ExpressionCache>,
    ) -> Self {
        Self {
            service,
            publisher,
            expressions,
            message_log: None,
        }
    }

    /// Record every inbound message in `log` before it is processed
    pub fn with_message_log(mut self, log: Arc<MessageLog>) -> Self {
        self.message_log = Some(log);
        self
    }

    /// Fan `message` out to every matching subscription.
    ///
    /// Returns the handles of the per-subscription tasks; callers on the hot
    /// path drop them, tests await them.
    pub async fn process(self: &Arc<Self>, message: InboundMessage) -> Vec<JoinHandle<()>> {
        metrics().message_received();
        if let Some(log) = &self.message_log {
            log.record(&message);
        }

        let subscriptions = match self.service.get_subscriptions_for_topic(&message.topic).await {
            Ok(subs) => subs,
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Error getting subscriptions for topic");
                return Vec::new();
            }
        };

        let globals = match self.service.get_global_parameters().await {
            Ok(globals) => globals,
            Err(e) => {
                warn!(error = %e, "Error getting global parameters");
                return Vec::new();
            }
        };

        metrics().subscriptions_matched(subscriptions.len());
        debug!(
            topic = %message.topic,
            client = %message.client,
            matched = subscriptions.len(),
            "Resolved subscriptions for message"
        );

        let message = Arc::new(message);
        let globals = Arc::new(globals);

        subscriptions
            .into_iter()
            .map(|sub| {
                let processor = Arc::clone(self);
                let message = Arc::clone(&message);
                let globals = Arc::clone(&globals);
                let span = crate::message_span!(topic = %message.topic, subscription_id = %sub.id);
                tokio::spawn(
                    async move { processor.handle_subscription(sub, &message, &globals).await }
                        .instrument(span),
                )
            })
            .collect()
    }

    async fn handle_subscription(
        &self,
        sub: Subscription,
        message: &InboundMessage,
        globals: &BTreeMap<String, String>,
    ) {
        let payload_text = message.payload_text();
        let mut bag = Map::new();
        bag.insert(
            "meta".to_string(),
            json!({
                "topic": message.topic,
                "client": message.client,
                "payload": payload_text,
            }),
        );
        bag.insert("global".to_string(), json!(globals));
        bag.insert(
            "extract".to_string(),
            Value::Object(self.extract(&sub, &message.payload)),
        );

        let filter_has_placeholders = template::has_template_syntax(&sub.filter);
        let sub = match self.service.apply_placeholders_on_subscription(&sub, &bag) {
            Ok(hydrated) => hydrated,
            Err(e) => {
                metrics().hydration_failed();
                warn!(subscription_id = %sub.id, error = %e, "Error applying placeholders to subscription");
                return;
            }
        };

        let bag = Value::Object(bag);
        if !self.passes_filter(&sub, &bag, filter_has_placeholders) {
            metrics().message_filtered();
            debug!(subscription_id = %sub.id, "Message was filtered out");
            return;
        }

        let body = self.render_body(&sub, &bag, &message.payload);
        self.publisher.publish(body, sub).await;
    }

    /// Evaluate every extract rule against the JSON payload. Rules that fail
    /// or yield undefined are left out.
    fn extract(&self, sub: &Subscription, payload: &[u8]) -> Map<String, Value> {
        let mut values = Map::new();
        if sub.extract.is_empty() {
            return values;
        }

        let data: Value = match serde_json::from_slice(payload) {
            Ok(data) => data,
            Err(e) => {
                debug!(subscription_id = %sub.id, error = %e, "Topic message was not JSON");
                return values;
            }
        };

        for (key, expression) in &sub.extract {
            match self.expressions.evaluate(expression, &data) {
                Ok(Some(value)) => {
                    values.insert(key.clone(), value);
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(subscription_id = %sub.id, key = %key, error = %e, "Error extracting value");
                }
            }
        }

        values
    }

    /// Only an expression that evaluates to `false` suppresses dispatch.
    ///
    /// A filter that was hydrated from placeholders differs per message and
    /// is compiled without caching.
    fn passes_filter(&self, sub: &Subscription, bag: &Value, hydrated: bool) -> bool {
        if sub.filter.is_empty() {
            return true;
        }

        let result = if hydrated {
            Expression::compile(&sub.filter).and_then(|expression| expression.evaluate(bag))
        } else {
            self.expressions.evaluate(&sub.filter, bag)
        };

        match result {
            Ok(Some(Value::Bool(false))) => false,
            Ok(_) => true,
            Err(e) => {
                warn!(subscription_id = %sub.id, error = %e, "Error evaluating filter expression");
                true
            }
        }
    }

    fn render_body(&self, sub: &Subscription, bag: &Value, payload: &Bytes) -> Bytes {
        if sub.body_template.is_empty() {
            return payload.clone();
        }

        // Hydration already folded message data into the body
        match self.templates().render_inline_once(&sub.body_template, bag) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                metrics().render_fell_back();
                warn!(subscription_id = %sub.id, error = %e, "Error rendering body template");
                payload.clone()
            }
        }
    }

    fn templates(&self) -> &TemplateCache {
        self.service.templates()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::RecordingPublisher;

    fn processor() -> Processor {
        let service = SubscriptionService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(TemplateCache::new()),
        );
        Processor::new(
            Arc::new(service),
            Arc::new(RecordingPublisher::new()),
            Arc::new(ExpressionCache::new()),
        )
    }

    fn sub_with_extract(rules: &[(&str, &str)]) -> Subscription {
        Subscription {
            id: "s".into(),
            extract: rules
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_extract_skips_undefined_and_failing_rules() {
        let p = processor();
        let sub = sub_with_extract(&[
            ("action", "action"),
            ("missing", "nothing.here"),
            ("broken", "action +"),
        ]);
        let values = p.extract(&sub, br#"{"action":"single"}"#);
        assert_eq!(values.len(), 1);
        assert_eq!(values["action"], json!("single"));
    }

    #[test]
    fn test_extract_non_json_payload_is_empty() {
        let p = processor();
        let sub = sub_with_extract(&[("action", "action")]);
        assert!(p.extract(&sub, b"not json").is_empty());
    }

    #[test]
    fn test_filter_fails_open() {
        let p = processor();
        let bag = json!({"extract": {"v": true}});
        let mut sub = Subscription::default();

        assert!(p.passes_filter(&sub, &bag, false));

        sub.filter = "extract.v = true".into();
        assert!(p.passes_filter(&sub, &bag, false));

        sub.filter = "extract.v = false".into();
        assert!(!p.passes_filter(&sub, &bag, false));

        // Syntax error and non-boolean results still dispatch
        sub.filter = "extract.v = (".into();
        assert!(p.passes_filter(&sub, &bag, false));
        sub.filter = "extract.v".into();
        assert!(p.passes_filter(&sub, &json!({"extract": {"v": 0}}), false));
    }

    #[test]
    fn test_hydrated_filter_bypasses_expression_cache() {
        let p = processor();
        let mut sub = Subscription::default();
        for i in 0..10 {
            sub.filter = format!("{i} = {i}");
            assert!(p.passes_filter(&sub, &json!({}), true));
        }
        sub.filter = "1 = 2".into();
        assert!(!p.passes_filter(&sub, &json!({}), true));
        assert!(p.expressions.is_empty());
    }

    #[test]
    fn test_empty_body_template_forwards_payload() {
        let p = processor();
        let payload = Bytes::from_static(b"\x00raw");
        let body = p.render_body(&Subscription::default(), &json!({}), &payload);
        assert_eq!(body, payload);
    }

    #[test]
    fn test_broken_body_template_forwards_payload() {
        let p = processor();
        let sub = Subscription {
            body_template: "{% if %}".into(),
            ..Default::default()
        };
        let payload = Bytes::from_static(b"{\"a\":1}");
        assert_eq!(p.render_body(&sub, &json!({}), &payload), payload);
    }
}
