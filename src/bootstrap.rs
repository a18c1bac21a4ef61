//! Development data seeding

use crate::error::BridgeResult;
use crate::subscription::{Subscription, SubscriptionService};
use std::collections::BTreeMap;
use tracing::info;

/// Wipe the store and load a small known data set
pub async fn populate_data_store(service: &SubscriptionService) -> BridgeResult<Subscription> {
    service.reset().await?;

    let sub = service.add_subscription(shortcut_button()).await?;
    info!(subscription_id = %sub.id, "Added development subscription");

    service.set_global_parameter("authToken", "abcdef").await?;
    Ok(sub)
}

fn shortcut_button() -> Subscription {
    Subscription {
        name: "Shortcut Button 001".to_string(),
        topic: "zigbee2mqtt/shortcut-button-001".to_string(),
        extract: BTreeMap::from([
            ("action".to_string(), "action".to_string()),
            ("battery".to_string(), "battery".to_string()),
        ]),
        filter: "extract.action = '1_short_release'".to_string(),
        method: "PATCH".to_string(),
        url: "https://straight-application-12.webhook.cool".to_string(),
        headers: BTreeMap::from([
            (
                "Authorization".to_string(),
                "Bearer {{ global.authToken }}".to_string(),
            ),
            ("Content-Type".to_string(), "application/json".to_string()),
        ]),
        body_template: r#"{"action":"{{extract.action}}","battery":"{{extract.battery}}"}"#
            .to_string(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::template::TemplateCache;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_populate_replaces_existing_data() {
        let service = SubscriptionService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(TemplateCache::new()),
        );
        service
            .add_subscription(Subscription {
                name: "old".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let seeded = populate_data_store(&service).await.unwrap();

        let subs = service.get_subscriptions().await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id, seeded.id);
        assert_eq!(subs[0].name, "Shortcut Button 001");
        assert_eq!(
            service.get_global_parameters().await.unwrap()["authToken"],
            "abcdef"
        );
    }
}
