//! Persistence for subscriptions, subscription templates and global parameters
//!
//! [`Store`] is the contract the subscription service depends on. Two
//! implementations are provided: [`MemoryStore`] (volatile) and
//! [`FileStore`] (JSON document with write-through and periodic reload).

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::subscription::{Subscription, SubscriptionTemplate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("subscription template not found: {0}")]
    SubscriptionTemplateNotFound(String),

    #[error("record already exists: {0}")]
    Conflict(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence contract; implementations are internally synchronized
#[async_trait]
pub trait Store: Send + Sync {
    async fn add_subscription(&self, subscription: Subscription) -> StoreResult<Subscription>;
    async fn get_subscription(&self, id: &str) -> StoreResult<Subscription>;
    async fn get_subscriptions(&self) -> StoreResult<Vec<Subscription>>;
    async fn update_subscription(&self, subscription: Subscription) -> StoreResult<Subscription>;
    async fn delete_subscription(&self, id: &str) -> StoreResult<()>;

    async fn add_subscription_template(
        &self,
        template: SubscriptionTemplate,
    ) -> StoreResult<SubscriptionTemplate>;
    async fn get_subscription_template(&self, id: &str) -> StoreResult<SubscriptionTemplate>;
    async fn get_subscription_templates(&self) -> StoreResult<Vec<SubscriptionTemplate>>;
    async fn update_subscription_template(
        &self,
        template: SubscriptionTemplate,
    ) -> StoreResult<SubscriptionTemplate>;
    async fn delete_subscription_template(&self, id: &str) -> StoreResult<()>;

    /// Store `value` under `key`; an empty value deletes the key
    async fn set_global_parameter(&self, key: &str, value: &str) -> StoreResult<()>;
    async fn get_global_parameters(&self) -> StoreResult<BTreeMap<String, String>>;
    /// Deleting an absent key is a no-op
    async fn delete_global_parameter(&self, key: &str) -> StoreResult<()>;
}

/// The full data set, also the on-disk document of [`FileStore`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoreData {
    #[serde(default)]
    pub global_parameters: BTreeMap<String, String>,
    #[serde(default)]
    pub subscriptions: HashMap<String, Subscription>,
    #[serde(default)]
    pub subscription_templates: HashMap<String, SubscriptionTemplate>,
}

impl StoreData {
    pub fn add_subscription(&mut self, subscription: Subscription) -> StoreResult<Subscription> {
        if self.subscriptions.contains_key(&subscription.id) {
            return Err(StoreError::Conflict(subscription.id));
        }
        self.subscriptions
            .insert(subscription.id.clone(), subscription.clone());
        Ok(subscription)
    }

    pub fn get_subscription(&self, id: &str) -> StoreResult<Subscription> {
        self.subscriptions
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::SubscriptionNotFound(id.to_string()))
    }

    pub fn update_subscription(&mut self, subscription: Subscription) -> StoreResult<Subscription> {
        match self.subscriptions.get_mut(&subscription.id) {
            Some(existing) => {
                *existing = subscription.clone();
                Ok(subscription)
            }
            None => Err(StoreError::SubscriptionNotFound(subscription.id)),
        }
    }

    pub fn delete_subscription(&mut self, id: &str) -> StoreResult<()> {
        self.subscriptions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::SubscriptionNotFound(id.to_string()))
    }

    pub fn add_subscription_template(
        &mut self,
        template: SubscriptionTemplate,
    ) -> StoreResult<SubscriptionTemplate> {
        let id = template.id().to_string();
        if self.subscription_templates.contains_key(&id) {
            return Err(StoreError::Conflict(id));
        }
        self.subscription_templates.insert(id, template.clone());
        Ok(template)
    }

    pub fn get_subscription_template(&self, id: &str) -> StoreResult<SubscriptionTemplate> {
        self.subscription_templates
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::SubscriptionTemplateNotFound(id.to_string()))
    }

    pub fn update_subscription_template(
        &mut self,
        template: SubscriptionTemplate,
    ) -> StoreResult<SubscriptionTemplate> {
        match self.subscription_templates.get_mut(template.id()) {
            Some(existing) => {
                *existing = template.clone();
                Ok(template)
            }
            None => Err(StoreError::SubscriptionTemplateNotFound(
                template.id().to_string(),
            )),
        }
    }

    pub fn delete_subscription_template(&mut self, id: &str) -> StoreResult<()> {
        self.subscription_templates
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::SubscriptionTemplateNotFound(id.to_string()))
    }

    pub fn set_global_parameter(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            self.global_parameters.remove(key);
        } else {
            self.global_parameters
                .insert(key.to_string(), value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(id: &str) -> Subscription {
        Subscription {
            id: id.to_string(),
            name: format!("sub {id}"),
            topic: "a/b".into(),
            method: "POST".into(),
            url: "http://localhost/hook".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_add_conflict() {
        let mut data = StoreData::default();
        data.add_subscription(sub("1")).unwrap();
        assert!(matches!(
            data.add_subscription(sub("1")),
            Err(StoreError::Conflict(id)) if id == "1"
        ));
    }

    #[test]
    fn test_update_and_delete_missing() {
        let mut data = StoreData::default();
        assert!(matches!(
            data.update_subscription(sub("x")),
            Err(StoreError::SubscriptionNotFound(_))
        ));
        assert!(matches!(
            data.delete_subscription("x"),
            Err(StoreError::SubscriptionNotFound(_))
        ));
        assert!(matches!(
            data.delete_subscription_template("x"),
            Err(StoreError::SubscriptionTemplateNotFound(_))
        ));
    }

    #[test]
    fn test_empty_global_value_deletes() {
        let mut data = StoreData::default();
        data.set_global_parameter("token", "abc");
        assert_eq!(data.global_parameters.get("token").map(String::as_str), Some("abc"));
        data.set_global_parameter("token", "");
        assert!(data.global_parameters.is_empty());
    }

    #[test]
    fn test_document_field_names() {
        let mut data = StoreData::default();
        data.set_global_parameter("k", "v");
        let value = serde_json::to_value(&data).unwrap();
        assert!(value.get("globalParameters").is_some());
        assert!(value.get("subscriptions").is_some());
        assert!(value.get("subscriptionTemplates").is_some());
    }
}
