//! MQTT broker listeners
//!
//! - [`connection`] - client options, connection state and retry schedule
//! - [`message_handler`] - routing of raw rumqttc events
//! - [`listener`] - the event loop task of one broker
//!
//! ```rust,no_run
//! use mqtt_http_bridge::config::BridgeConfig;
//! use mqtt_http_bridge::processor::Processor;
//! use mqtt_http_bridge::transport::mqtt::spawn_listeners;
//! use std::sync::Arc;
//!
//! # fn run(config: BridgeConfig, processor: Arc<Processor>) -> Result<(), Box<dyn std::error::Error>> {
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let listeners = spawn_listeners(&config.brokers, &processor, &shutdown_rx)?;
//! // ...
//! shutdown_tx.send(true)?;
//! # drop(listeners);
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod listener;
pub mod message_handler;

pub use connection::{ConnectionState, MqttError, ReconnectConfig};
pub use listener::{spawn_listeners, MqttListener};
pub use message_handler::{EventRoute, MessageHandler};
