//! Transports that deliver inbound messages to the processor

pub mod mqtt;
