//! Recent inbound MQTT traffic, replayed and streamed to API clients
//!
//! Every message the processor receives is stamped with a global sequence
//! number and kept in a bounded per-broker history. Live subscribers receive
//! new entries through a broadcast channel.

use crate::processor::InboundMessage;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Entries kept per broker connection
pub const DEFAULT_HISTORY_SIZE: usize = 50;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Broker connection the message arrived on
    pub server: String,
    pub topic: String,
    pub payload: String,
    pub sequence: u64,
}

#[derive(Debug, Default)]
struct LogState {
    sequence: u64,
    history: HashMap<String, VecDeque<LogEntry>>,
}

#[derive(Debug)]
pub struct MessageLog {
    state: Mutex<LogState>,
    history_size: usize,
    tx: broadcast::Sender<LogEntry>,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl MessageLog {
    pub fn new(history_size: usize) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(LogState::default()),
            history_size,
            tx,
        }
    }

    /// Append `message` to its broker's history and notify live subscribers
    pub fn record(&self, message: &InboundMessage) -> LogEntry {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.sequence += 1;

        let entry = LogEntry {
            server: message.client.clone(),
            topic: message.topic.clone(),
            payload: String::from_utf8_lossy(&message.payload).into_owned(),
            sequence: state.sequence,
        };

        let history = state.history.entry(entry.server.clone()).or_default();
        history.push_back(entry.clone());
        while history.len() > self.history_size {
            history.pop_front();
        }

        // Sent under the lock so a concurrent subscribe sees each entry once
        let _ = self.tx.send(entry.clone());
        entry
    }

    /// Retained entries newer than `last_seen`, oldest first, plus a
    /// receiver for everything recorded afterwards
    pub fn subscribe(&self, last_seen: u64) -> (Vec<LogEntry>, broadcast::Receiver<LogEntry>) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let mut backlog: Vec<LogEntry> = state
            .history
            .values()
            .flatten()
            .filter(|entry| entry.sequence > last_seen)
            .cloned()
            .collect();
        backlog.sort_by_key(|entry| entry.sequence);

        (backlog, self.tx.subscribe())
    }
}
