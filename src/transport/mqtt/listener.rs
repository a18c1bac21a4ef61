//! Broker listener: owns the rumqttc event loop of one configured broker and
//! feeds every received publish into the [`Processor`].

use super::connection::{configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::BrokerSection;
use crate::observability::metrics::metrics;
use crate::processor::Processor;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

pub struct MqttListener {
    broker: BrokerSection,
    processor: Arc<Processor>,
    reconnect_config: ReconnectConfig,
    state_tx: watch::Sender<ConnectionState>,
}

impl MqttListener {
    pub fn new(broker: BrokerSection, processor: Arc<Processor>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            broker,
            processor,
            reconnect_config: ReconnectConfig::default(),
            state_tx,
        }
    }

    pub fn with_reconnect_config(mut self, reconnect_config: ReconnectConfig) -> Self {
        self.reconnect_config = reconnect_config;
        self
    }

    /// Observe connection state changes
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Start the event loop on a background task until `shutdown` flips to true
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Result<JoinHandle<()>, MqttError> {
        let options = configure_mqtt_options(&self.broker)?;
        let (client, event_loop) = AsyncClient::new(options, 10);
        let span = crate::mqtt_span!(broker = %self.broker.name);

        info!(
            broker = %self.broker.name,
            url = %self.broker.broker_url,
            topics = ?self.broker.topics,
            "Starting MQTT listener"
        );
        Ok(tokio::spawn(
            self.run(client, event_loop, shutdown).instrument(span),
        ))
    }

    async fn run(
        self,
        client: AsyncClient,
        mut event_loop: EventLoop,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut failed_attempts = 0u32;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(broker = %self.broker.name, "Shutdown signal received, stopping MQTT listener");
                        break;
                    }
                }

                event = event_loop.poll() => {
                    match event {
                        Ok(event) => {
                            match MessageHandler::route_mqtt_event(&event) {
                                EventRoute::ConnectionAcknowledged => {
                                    failed_attempts = 0;
                                    self.on_connected(&client);
                                }
                                EventRoute::MessageReceived { topic, payload } => {
                                    let message =
                                        MessageHandler::inbound_message(&self.broker.name, topic, payload);
                                    // Per-subscription tasks run detached
                                    drop(self.processor.process(message).await);
                                }
                                EventRoute::Disconnected => {
                                    self.on_disconnected("broker sent disconnect".to_string());
                                }
                                EventRoute::Ignored => {}
                            }
                        }
                        Err(e) => {
                            failed_attempts += 1;
                            metrics().mqtt_connection_failed();
                            self.on_disconnected(e.to_string());

                            let delay = self.reconnect_config.calculate_backoff_delay(failed_attempts);
                            warn!(
                                broker = %self.broker.name,
                                error = %e,
                                attempt = failed_attempts,
                                delay_ms = delay.as_millis() as u64,
                                "MQTT connection error, retrying"
                            );
                            if !interruptible_sleep(shutdown.clone(), delay).await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        if let Err(e) = client.try_disconnect() {
            debug!(broker = %self.broker.name, error = %e, "Disconnect request not sent");
        }
        self.on_disconnected("shutdown".to_string());
        info!(broker = %self.broker.name, "MQTT listener stopped");
    }

    fn on_connected(&self, client: &AsyncClient) {
        info!(broker = %self.broker.name, "MQTT client connected successfully");
        metrics().mqtt_connection_established();
        self.state_tx.send_replace(ConnectionState::Connected);

        // Subscribing sends through the request channel the event loop drains,
        // so it must not be awaited from the loop itself
        let client = client.clone();
        let topics = self.broker.topics.clone();
        let broker = self.broker.name.clone();
        tokio::spawn(async move {
            if let Err(e) = subscribe_all(&client, &topics).await {
                error!(broker = %broker, error = %e, "Failed to subscribe");
            }
        });
    }

    fn on_disconnected(&self, reason: String) {
        let previous = self
            .state_tx
            .send_replace(ConnectionState::Disconnected(reason));
        if previous == ConnectionState::Connected {
            metrics().mqtt_connection_lost();
        }
    }
}

async fn subscribe_all(client: &AsyncClient, topics: &[String]) -> Result<(), MqttError> {
    for topic in topics {
        client
            .subscribe(topic.clone(), QoS::AtLeastOnce)
            .await
            .map_err(|source| MqttError::SubscriptionFailed {
                topic: topic.clone(),
                source,
            })?;
        debug!(target: "mqtt_transport", "Subscribed to: {}", topic);
    }
    Ok(())
}

/// Returns false if shutdown was requested before the delay elapsed
async fn interruptible_sleep(mut shutdown: watch::Receiver<bool>, delay: Duration) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
        _ = tokio::time::sleep(delay) => true,
    }
}

/// Start one listener per configured broker
pub fn spawn_listeners(
    brokers: &[BrokerSection],
    processor: &Arc<Processor>,
    shutdown: &watch::Receiver<bool>,
) -> Result<Vec<JoinHandle<()>>, MqttError> {
    brokers
        .iter()
        .map(|broker| {
            MqttListener::new(broker.clone(), Arc::clone(processor)).spawn(shutdown.clone())
        })
        .collect()
}
