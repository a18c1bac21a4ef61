//! Webhook dispatch
//!
//! [`HttpPublisher`] is a bounded job queue drained by a fixed pool of
//! workers. Each worker owns its own HTTP client. Dispatch failures are
//! logged and counted, never retried and never reported to the caller.

use crate::config::PublisherSection;
use crate::error::{BridgeError, BridgeResult};
use crate::observability::metrics::metrics;
use crate::subscription::Subscription;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

pub const SUBSCRIPTION_ID_HEADER: &str = "Subscription-ID";
pub const SUBSCRIPTION_NAME_HEADER: &str = "Subscription-Name";

/// Sink for rendered webhook bodies
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Queue `body` for delivery to `subscription`. Returns once the job is
    /// queued, not when it is delivered.
    async fn publish(&self, body: Bytes, subscription: Subscription);
}

/// One queued webhook call
#[derive(Debug, Clone)]
pub struct PublishJob {
    pub body: Bytes,
    pub subscription: Subscription,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),

    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Worker pool delivering webhooks over HTTP
pub struct HttpPublisher {
    jobs: mpsc::Sender<PublishJob>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl HttpPublisher {
    /// Start `config.workers` workers that run until `shutdown` flips to true
    pub fn start(config: &PublisherSection, shutdown: watch::Receiver<bool>) -> BridgeResult<Self> {
        let (tx, rx) = mpsc::channel(config.queue_size);
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            let client = build_client(config.request_timeout())?;
            workers.push(tokio::spawn(run_worker(
                worker_id,
                client,
                Arc::clone(&rx),
                shutdown.clone(),
            )));
        }

        info!(
            workers = config.workers,
            queue_size = config.queue_size,
            "Webhook publisher started"
        );

        Ok(Self {
            jobs: tx,
            workers: Mutex::new(workers),
        })
    }

    /// Wait for every worker to exit
    pub async fn join(&self) {
        let workers: Vec<_> = self.workers.lock().await.drain(..).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Publisher worker panicked");
            }
        }
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, body: Bytes, subscription: Subscription) {
        let subscription_id = subscription.id.clone();
        // Blocks while the queue is full
        match self.jobs.send(PublishJob { body, subscription }).await {
            Ok(()) => metrics().webhook_queued(),
            Err(_) => warn!(
                subscription_id = %subscription_id,
                "Publisher is shut down, dropping webhook"
            ),
        }
    }
}

fn build_client(timeout: Option<Duration>) -> BridgeResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| BridgeError::internal(format!("failed to build HTTP client: {e}")))
}

async fn run_worker(
    worker_id: usize,
    client: reqwest::Client,
    jobs: Arc<Mutex<mpsc::Receiver<PublishJob>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker_id, "Publisher worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let job = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            job = next_job(&jobs) => job,
        };

        let Some(job) = job else {
            break;
        };
        deliver(&client, &job).await;
    }

    debug!(worker_id, "Publisher worker stopped");
}

async fn next_job(jobs: &Mutex<mpsc::Receiver<PublishJob>>) -> Option<PublishJob> {
    jobs.lock().await.recv().await
}

async fn deliver(client: &reqwest::Client, job: &PublishJob) {
    let sub = &job.subscription;
    debug!(
        subscription_id = %sub.id,
        method = %sub.method,
        url = %sub.url,
        body = %String::from_utf8_lossy(&job.body),
        "Publishing message to subscription"
    );

    let started = Instant::now();
    match send_webhook(client, job).await {
        Ok(status) if status.is_success() => {
            metrics().webhook_completed(started.elapsed(), true);
            debug!(subscription_id = %sub.id, status = status.as_u16(), "Webhook delivered");
        }
        Ok(status) => {
            metrics().webhook_completed(started.elapsed(), false);
            warn!(
                subscription_id = %sub.id,
                status = status.as_u16(),
                "Unexpected status code publishing message to subscription"
            );
        }
        Err(e) => {
            metrics().webhook_failed();
            warn!(subscription_id = %sub.id, error = %e, "Error publishing message to subscription");
        }
    }
}

/// Send one webhook and return the response status
pub async fn send_webhook(
    client: &reqwest::Client,
    job: &PublishJob,
) -> Result<StatusCode, DispatchError> {
    let sub = &job.subscription;

    let method = Method::from_bytes(sub.method.as_bytes())
        .map_err(|_| DispatchError::InvalidMethod(sub.method.clone()))?;
    let url = Url::parse(&sub.url).map_err(|source| DispatchError::InvalidUrl {
        url: sub.url.clone(),
        source,
    })?;

    let mut request = client.request(method, url);
    for (name, value) in &sub.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    let response = request
        .header(SUBSCRIPTION_ID_HEADER, sub.id.as_str())
        .header(SUBSCRIPTION_NAME_HEADER, sub.name.as_str())
        .body(job.body.clone())
        .send()
        .await?;

    Ok(response.status())
}
