//! Connection configuration and state for broker listeners

use crate::config::BrokerSection;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Connection state of one broker listener
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected(String),
}

/// Delay schedule between failed polls of the event loop
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delays in milliseconds for the first attempts
    pub backoff_pattern: Vec<u64>,
    /// Delay once the pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: vec![250, 500, 1000, 2500],
            sustained_delay: 5000,
        }
    }
}

impl ReconnectConfig {
    /// Delay before retry number `attempt` (1-based)
    pub fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1) as usize;
        let millis = self
            .backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay);
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),

    #[error("Subscription to '{topic}' failed: {source}")]
    SubscriptionFailed {
        topic: String,
        #[source]
        source: rumqttc::v5::ClientError,
    },
}

/// Build client options for `broker`; credentials come from the environment
pub fn configure_mqtt_options(broker: &BrokerSection) -> Result<MqttOptions, MqttError> {
    let url = Url::parse(&broker.broker_url)
        .map_err(|_| MqttError::InvalidBrokerUrl(broker.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(broker.broker_url.clone()))?;
    let tls = match url.scheme() {
        "mqtt" => false,
        "mqtts" => true,
        _ => return Err(MqttError::InvalidBrokerUrl(broker.broker_url.clone())),
    };
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    let mut mqtt_options = MqttOptions::new(broker.client_id(), host, port);

    if tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = broker.username() {
        let password = broker.password().unwrap_or_default();
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_keep_alive(Duration::from_secs(60));
    mqtt_options.set_max_packet_size(Some(256 * 1024));

    Ok(mqtt_options)
}
