//! Mock implementations for testing

use crate::publisher::Publisher;
use crate::subscription::Subscription;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// A webhook handed to [`RecordingPublisher`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedWebhook {
    pub body: Bytes,
    pub subscription: Subscription,
}

impl PublishedWebhook {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Publisher that records every call instead of sending HTTP requests
#[derive(Debug, Default, Clone)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<PublishedWebhook>>>,
    notify: Arc<Notify>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_published(&self) -> Vec<PublishedWebhook> {
        self.published.lock().await.clone()
    }

    pub async fn clear_history(&self) {
        self.published.lock().await.clear();
    }

    /// Wait until at least `count` webhooks were recorded, or `timeout` elapses.
    /// Returns whatever was recorded.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<PublishedWebhook> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            {
                let published = self.published.lock().await;
                if published.len() >= count {
                    return published.clone();
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.get_published().await;
            }
        }
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, body: Bytes, subscription: Subscription) {
        self.published
            .lock()
            .await
            .push(PublishedWebhook { body, subscription });
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_publisher_records_calls() {
        let publisher = RecordingPublisher::new();
        let sub = Subscription {
            id: "abc".into(),
            ..Default::default()
        };
        publisher.publish(Bytes::from_static(b"hello"), sub).await;

        let published = publisher.get_published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].body_text(), "hello");
        assert_eq!(published[0].subscription.id, "abc");

        publisher.clear_history().await;
        assert!(publisher.get_published().await.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_returns_on_timeout() {
        let publisher = RecordingPublisher::new();
        let published = publisher.wait_for(1, Duration::from_millis(20)).await;
        assert!(published.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_wakes_on_publish() {
        let publisher = RecordingPublisher::new();
        let waiter = {
            let publisher = publisher.clone();
            tokio::spawn(async move { publisher.wait_for(1, Duration::from_secs(5)).await })
        };
        publisher
            .publish(Bytes::from_static(b"x"), Subscription::default())
            .await;
        assert_eq!(waiter.await.unwrap().len(), 1);
    }
}
