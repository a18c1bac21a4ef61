use super::{Store, StoreData, StoreResult};
use crate::subscription::{Subscription, SubscriptionTemplate};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Store backed by a single JSON document on disk.
///
/// Every mutation is written through to the file. The file is also reloaded
/// periodically so external edits are picked up.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    data: RwLock<StoreData>,
    /// Serializes file writes and reloads so the document on disk always
    /// reflects the latest mutation
    fs_lock: Mutex<()>,
}

impl FileStore {
    /// Load `path` (a missing file is an empty store) and write it back immediately
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Arc<Self>> {
        let store = Arc::new(Self {
            path: path.into(),
            data: RwLock::new(StoreData::default()),
            fs_lock: Mutex::new(()),
        });

        store.reload().await?;
        {
            let _fs = store.fs_lock.lock().await;
            let snapshot = store.data.read().await.clone();
            store.write_document(&snapshot).await?;
        }

        info!(path = %store.path.display(), "File store opened");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace in-memory state with the file contents
    pub async fn reload(&self) -> StoreResult<()> {
        let _fs = self.fs_lock.lock().await;

        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let document: StoreData = serde_json::from_slice(&bytes)?;
        *self.data.write().await = document;
        debug!(path = %self.path.display(), "File store reloaded");
        Ok(())
    }

    /// Reload every `interval` until `shutdown` flips to true
    pub fn spawn_reload(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            debug!("Stopping file store reload task");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = store.reload().await {
                            warn!(path = %store.path.display(), error = %e, "Failed to reload file store");
                        }
                    }
                }
            }
        })
    }

    /// Apply `mutation` to a copy, write it through to disk, then publish it.
    /// A failed write leaves the in-memory state untouched.
    async fn mutate<T>(
        &self,
        mutation: impl FnOnce(&mut StoreData) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let _fs = self.fs_lock.lock().await;

        let mut next = self.data.read().await.clone();
        let result = mutation(&mut next)?;
        self.write_document(&next).await?;
        *self.data.write().await = next;
        Ok(result)
    }

    async fn write_document(&self, data: &StoreData) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(data)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for FileStore {
    async fn add_subscription(&self, subscription: Subscription) -> StoreResult<Subscription> {
        self.mutate(|data| data.add_subscription(subscription)).await
    }

    async fn get_subscription(&self, id: &str) -> StoreResult<Subscription> {
        self.data.read().await.get_subscription(id)
    }

    async fn get_subscriptions(&self) -> StoreResult<Vec<Subscription>> {
        Ok(self.data.read().await.subscriptions.values().cloned().collect())
    }

    async fn update_subscription(&self, subscription: Subscription) -> StoreResult<Subscription> {
        self.mutate(|data| data.update_subscription(subscription))
            .await
    }

    async fn delete_subscription(&self, id: &str) -> StoreResult<()> {
        self.mutate(|data| data.delete_subscription(id)).await
    }

    async fn add_subscription_template(
        &self,
        template: SubscriptionTemplate,
    ) -> StoreResult<SubscriptionTemplate> {
        self.mutate(|data| data.add_subscription_template(template))
            .await
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
        self.mutate(|data| data.update_subscription_template(template))
            .await
    }

    async fn delete_subscription_template(&self, id: &str) -> StoreResult<()> {
        self.mutate(|data| data.delete_subscription_template(id))
            .await
    }

    async fn set_global_parameter(&self, key: &str, value: &str) -> StoreResult<()> {
        self.mutate(|data| {
            data.set_global_parameter(key, value);
            Ok(())
        })
        .await
    }

    async fn get_global_parameters(&self) -> StoreResult<BTreeMap<String, String>> {
        Ok(self.data.read().await.global_parameters.clone())
    }

    async fn delete_global_parameter(&self, key: &str) -> StoreResult<()> {
        self.mutate(|data| {
            data.global_parameters.remove(key);
            Ok(())
        })
        .await
    }
}
