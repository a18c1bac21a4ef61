//! Routing of raw MQTT events into listener decisions

use crate::processor::InboundMessage;
use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::Event;

/// What the listener should do with an event
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// (Re)connected; topics must be subscribed again
    ConnectionAcknowledged,
    MessageReceived { topic: String, payload: Bytes },
    Disconnected,
    /// Acks, pings and outgoing traffic
    Ignored,
}

pub struct MessageHandler;

impl MessageHandler {
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => EventRoute::ConnectionAcknowledged,
            Event::Incoming(Packet::Publish(publish)) => EventRoute::MessageReceived {
                topic: String::from_utf8_lossy(&publish.topic).into_owned(),
                payload: publish.payload.clone(),
            },
            Event::Incoming(Packet::Disconnect(_)) => EventRoute::Disconnected,
            _ => EventRoute::Ignored,
        }
    }

    /// Tag a received publish with the broker it arrived on
    pub fn inbound_message(broker: &str, topic: String, payload: Bytes) -> InboundMessage {
        InboundMessage {
            topic,
            client: broker.to_string(),
            payload,
        }
    }
}
