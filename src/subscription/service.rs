use super::hydration::{apply_placeholders, HydrationError};
use super::model::by_name_then_id;
use super::{Subscription, SubscriptionTemplate, TopicMatcher};
use crate::error::{BridgeError, BridgeResult};
use crate::store::Store;
use crate::template::TemplateCache;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const ID_LENGTH: usize = 12;

/// Fresh random identifier for subscriptions and templates
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LENGTH)
        .map(char::from)
        .collect()
}

/// Global parameter keys are letters, digits, `_` and `.`
pub fn is_valid_global_parameter_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Domain operations over subscriptions, templates and global parameters
pub struct SubscriptionService {
    store: Arc<dyn Store>,
    topic_matcher: TopicMatcher,
    templates: Arc<TemplateCache>,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn Store>, templates: Arc<TemplateCache>) -> Self {
        Self {
            store,
            topic_matcher: TopicMatcher::new(),
            templates,
        }
    }

    pub fn templates(&self) -> &Arc<TemplateCache> {
        &self.templates
    }

    pub async fn add_subscription(&self, mut subscription: Subscription) -> BridgeResult<Subscription> {
        subscription.id = generate_id();
        let stored = self.store.add_subscription(subscription).await?;
        info!(subscription_id = %stored.id, name = %stored.name, "Subscription added");
        Ok(stored)
    }

    pub async fn get_subscription(&self, id: &str) -> BridgeResult<Subscription> {
        Ok(self.store.get_subscription(id).await?)
    }

    /// All subscriptions, best-effort hydrated, sorted by (name, id)
    pub async fn get_subscriptions(&self) -> BridgeResult<Vec<Subscription>> {
        let mut subscriptions: Vec<Subscription> = self
            .store
            .get_subscriptions()
            .await?
            .into_iter()
            .map(|sub| self.hydrate_or_raw(sub))
            .collect();
        subscriptions.sort_by(by_name_then_id);
        Ok(subscriptions)
    }

    pub async fn update_subscription(&self, subscription: Subscription) -> BridgeResult<Subscription> {
        let stored = self.store.update_subscription(subscription).await?;
        info!(subscription_id = %stored.id, "Subscription updated");
        Ok(stored)
    }

    pub async fn delete_subscription(&self, id: &str) -> BridgeResult<()> {
        self.store.delete_subscription(id).await?;
        info!(subscription_id = %id, "Subscription deleted");
        Ok(())
    }

    pub async fn add_subscription_template(
        &self,
        mut template: SubscriptionTemplate,
    ) -> BridgeResult<SubscriptionTemplate> {
        template.subscription.id = generate_id();
        // Templates are blueprints, never derived from another template
        template.subscription.template_id = None;
        template.subscription.template_parameters.clear();
        let stored = self.store.add_subscription_template(template).await?;
        info!(template_id = %stored.id(), "Subscription template added");
        Ok(stored)
    }

    pub async fn get_subscription_template(&self, id: &str) -> BridgeResult<SubscriptionTemplate> {
        Ok(self.store.get_subscription_template(id).await?)
    }

    /// All templates, un-hydrated, sorted by (name, id)
    pub async fn get_subscription_templates(&self) -> BridgeResult<Vec<SubscriptionTemplate>> {
        let mut templates = self.store.get_subscription_templates().await?;
        templates.sort_by(|a, b| by_name_then_id(&a.subscription, &b.subscription));
        Ok(templates)
    }

    /// Update a template and re-apply its shared fields to every derived subscription.
    /// Stops at the first subscription that fails to update.
    pub async fn update_subscription_template(
        &self,
        template: SubscriptionTemplate,
    ) -> BridgeResult<SubscriptionTemplate> {
        let stored = self.store.update_subscription_template(template).await?;

        let derived: Vec<Subscription> = self
            .store
            .get_subscriptions()
            .await?
            .into_iter()
            .filter(|sub| sub.template_id.as_deref() == Some(stored.id()))
            .collect();

        let count = derived.len();
        for mut sub in derived {
            stored.propagate_to(&mut sub);
            self.store.update_subscription(sub).await?;
        }

        info!(
            template_id = %stored.id(),
            derived_subscriptions = count,
            "Subscription template updated"
        );
        Ok(stored)
    }

    /// Derived subscriptions keep their now dangling `template_id`
    pub async fn delete_subscription_template(&self, id: &str) -> BridgeResult<()> {
        self.store.delete_subscription_template(id).await?;
        info!(template_id = %id, "Subscription template deleted");
        Ok(())
    }

    /// Set a global parameter; an empty value deletes it
    pub async fn set_global_parameter(&self, key: &str, value: &str) -> BridgeResult<()> {
        if !is_valid_global_parameter_key(key) {
            return Err(BridgeError::invalid_key(key));
        }
        self.store.set_global_parameter(key, value).await?;
        debug!(key, "Global parameter set");
        Ok(())
    }

    pub async fn get_global_parameters(&self) -> BridgeResult<BTreeMap<String, String>> {
        Ok(self.store.get_global_parameters().await?)
    }

    pub async fn delete_global_parameter(&self, key: &str) -> BridgeResult<()> {
        self.store.delete_global_parameter(key).await?;
        debug!(key, "Global parameter deleted");
        Ok(())
    }

    /// Instantiate a template. Every required parameter must be present.
    pub async fn add_subscription_from_template(
        &self,
        template_id: &str,
        parameters: Map<String, Value>,
    ) -> BridgeResult<Subscription> {
        let template = self.store.get_subscription_template(template_id).await?;

        let missing = template.missing_parameters(&parameters);
        if !missing.is_empty() {
            return Err(BridgeError::missing_parameters(missing));
        }

        self.add_subscription(template.instantiate(parameters)).await
    }

    /// Subscriptions whose hydrated topic filter matches `topic`
    pub async fn get_subscriptions_for_topic(&self, topic: &str) -> BridgeResult<Vec<Subscription>> {
        Ok(self
            .store
            .get_subscriptions()
            .await?
            .into_iter()
            .map(|sub| self.hydrate_or_raw(sub))
            .filter(|sub| self.topic_matcher.matches(topic, &sub.topic))
            .collect())
    }

    pub fn apply_placeholders_on_subscription(
        &self,
        subscription: &Subscription,
        params: &Map<String, Value>,
    ) -> Result<Subscription, HydrationError> {
        apply_placeholders(&self.templates, subscription, params)
    }

    /// Delete every subscription, then every template
    pub async fn reset(&self) -> BridgeResult<()> {
        for sub in self.store.get_subscriptions().await? {
            self.store.delete_subscription(&sub.id).await?;
        }
        for template in self.store.get_subscription_templates().await? {
            self.store.delete_subscription_template(template.id()).await?;
        }
        self.topic_matcher.reset();
        warn!("Subscription data reset");
        Ok(())
    }

    fn hydrate_or_raw(&self, subscription: Subscription) -> Subscription {
        match self.apply_placeholders_on_subscription(&subscription, &Map::new()) {
            Ok(hydrated) => hydrated,
            Err(e) => {
                debug!(subscription_id = %subscription.id, error = %e, "Returning un-hydrated subscription");
                subscription
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id() {
        let id = generate_id();
        assert_eq!(id.len(), ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_id(), generate_id());
    }

    #[test]
    fn test_global_parameter_key_validation() {
        assert!(is_valid_global_parameter_key("authToken"));
        assert!(is_valid_global_parameter_key("service_1.token"));
        assert!(!is_valid_global_parameter_key(""));
        assert!(!is_valid_global_parameter_key("with space"));
        assert!(!is_valid_global_parameter_key("dash-key"));
        assert!(!is_valid_global_parameter_key("{{x}}"));
    }
}
