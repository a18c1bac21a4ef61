use super::{Store, StoreData, StoreResult};
use crate::subscription::{Subscription, SubscriptionTemplate};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Volatile store; contents are lost on restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn add_subscription(&self, subscription: Subscription) -> StoreResult<Subscription> {
        self.data.write().await.add_subscription(subscription)
    }

    async fn get_subscription(&self, id: &str) -> StoreResult<Subscription> {
        self.data.read().await.get_subscription(id)
    }

    async fn get_subscriptions(&self) -> StoreResult<Vec<Subscription>> {
        Ok(self.data.read().await.subscriptions.values().cloned().collect())
    }

    async fn update_subscription(&self, subscription: Subscription) -> StoreResult<Subscription> {
        self.data.write().await.update_subscription(subscription)
    }

    async fn delete_subscription(&self, id: &str) -> StoreResult<()> {
        self.data.write().await.delete_subscription(id)
    }

    async fn add_subscription_template(
        &self,
        template: SubscriptionTemplate,
    ) -> StoreResult<SubscriptionTemplate> {
        self.data.write().await.add_subscription_template(template)
    }

    async fn get_subscription_template(&self, id: &str) -> StoreResult<SubscriptionTemplate> {
        self.data.read().await.get_subscription_template(id)
    }

    async fn get_subscription_templates(&self) -> StoreResult<Vec<SubscriptionTemplate>> {
        Ok(self
            .data
            .read()
            .await
            .subscription_templates
            .values()
            .cloned()
            .collect())
    }

    async fn update_subscription_template(
        &self,
        template: SubscriptionTemplate,
    ) -> StoreResult<SubscriptionTemplate> {
        self.data.write().await.update_subscription_template(template)
    }

    async fn delete_subscription_template(&self, id: &str) -> StoreResult<()> {
        self.data.write().await.delete_subscription_template(id)
    }

    async fn set_global_parameter(&self, key: &str, value: &str) -> StoreResult<()> {
        self.data.write().await.set_global_parameter(key, value);
        Ok(())
    }

    async fn get_global_parameters(&self) -> StoreResult<BTreeMap<String, String>> {
        Ok(self.data.read().await.global_parameters.clone())
    }

    async fn delete_global_parameter(&self, key: &str) -> StoreResult<()> {
        self.data.write().await.global_parameters.remove(key);
        Ok(())
    }
}
