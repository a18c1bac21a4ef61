//! `/api/v1/mqtt`: websocket feed of inbound MQTT messages
//!
//! On connect the client receives the retained history newer than the
//! `last_seen_sequence` query parameter, then every new message as it
//! arrives. Each frame is one JSON [`LogEntry`].

use super::handlers::error_reply;
use crate::message_log::{LogEntry, MessageLog};
use futures::{SinkExt, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use warp::http::StatusCode;
use warp::reply::{Reply, Response};
use warp::ws::{Message, WebSocket, Ws};

/// `last_seen_sequence` from the query string; absent or unparseable
/// values replay everything
fn last_seen_sequence(query: &str) -> u64 {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "last_seen_sequence")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(0)
}

pub async fn upgrade(ws: Ws, query: String, log: Arc<MessageLog>) -> Result<Response, Infallible> {
    let last_seen = last_seen_sequence(&query);

    Ok(ws
        .on_upgrade(move |socket| stream_messages(socket, log, last_seen))
        .into_response())
}

pub async fn not_a_websocket() -> Result<Response, Infallible> {
    Ok(error_reply(
        StatusCode::BAD_REQUEST,
        vec!["Endpoint only supports Websocket".to_string()],
    ))
}

async fn stream_messages(socket: WebSocket, log: Arc<MessageLog>, last_seen: u64) {
    let (mut sink, mut incoming) = socket.split();
    let (backlog, mut live) = log.subscribe(last_seen);
    debug!(replayed = backlog.len(), last_seen, "MQTT log client connected");

    for entry in &backlog {
        if send(&mut sink, entry).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            event = live.recv() => match event {
                Ok(entry) => {
                    if send(&mut sink, &entry).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "MQTT log client fell behind");
                }
                Err(RecvError::Closed) => break,
            },
            frame = incoming.next() => match frame {
                Some(Ok(message)) if message.is_close() => break,
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }

    debug!("MQTT log client disconnected");
}

async fn send<S>(sink: &mut S, entry: &LogEntry) -> Result<(), ()>
where
    S: futures::Sink<Message> + Unpin,
{
    let text = serde_json::to_string(entry).map_err(|_| ())?;
    sink.send(Message::text(text)).await.map_err(|_| ())
}
