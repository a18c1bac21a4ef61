//! MQTT to HTTP bridge
//!
//! Listens on one or more MQTT brokers and forwards matching messages to
//! HTTP webhooks.
//!
//! # Overview
//!
//! A [`Subscription`] binds a topic pattern to a webhook. For every inbound
//! message the [`Processor`](processor::Processor):
//! - finds the subscriptions whose topic matches
//! - evaluates each `extract` expression against the payload
//! - drops the message when the `filter` expression is explicitly false
//! - renders headers and body and queues the request on the publisher
//!
//! Subscriptions can be derived from a [`SubscriptionTemplate`] by supplying
//! its required parameters; template updates propagate to derived
//! subscriptions. Everything is managed through the HTTP [`api`].
//!
//! # Quick Start
//!
//! ```rust
//! use mqtt_http_bridge::subscription::TopicMatcher;
//! use mqtt_http_bridge::template::render_inline;
//! use serde_json::json;
//!
//! let matcher = TopicMatcher::new();
//! assert!(matcher.matches("zigbee2mqtt/lamp/set", "zigbee2mqtt/+/set"));
//!
//! let name = render_inline("Button {{tpl.id}}", &json!({"tpl": {"id": "7"}})).unwrap();
//! assert_eq!(name, "Button 7");
//! ```

pub mod api;
pub mod bootstrap;
pub mod cache_key;
pub mod config;
pub mod error;
pub mod expression;
pub mod message_log;
pub mod observability;
pub mod processor;
pub mod publisher;
pub mod store;
pub mod subscription;
pub mod template;
pub mod testing;
pub mod transport;

pub use config::{BridgeConfig, BrokerSection, ConfigError};
pub use error::{BridgeError, BridgeResult};
pub use processor::{InboundMessage, Processor};
pub use publisher::{HttpPublisher, Publisher};
pub use subscription::{Subscription, SubscriptionService, SubscriptionTemplate};
