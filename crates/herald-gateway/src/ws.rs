// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime event stream over WebSocket.
//!
//! Server -> Client (JSON):
//! ```json
//! {"type": "hello", "at": "...", "msg": "realtime_connected"}
//! {"type": "event", "event": "messages.status.updated", "data": {...}, "at": "..."}
//! {"type": "pong", "at": "..."}
//! ```
//!
//! Client -> Server: `{"type": "ping"}`. Anything else is ignored.

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;

use herald_core::types::now;

use crate::auth::bearer_from_headers;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// WebSocket upgrade handler. Auth happens here rather than in middleware so
/// browser clients can pass the token as `?token=`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let presented = bearer_from_headers(&headers).or(query.token.as_deref());
    if !state.auth.accepts(presented) {
        tracing::debug!("rejected websocket handshake without valid token");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

fn hello_frame() -> String {
    json!({ "type": "hello", "at": now(), "msg": "realtime_connected" }).to_string()
}

/// Reply owed to a client frame, if any.
fn client_reply(text: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    (value.get("type").and_then(|t| t.as_str()) == Some("ping"))
        .then(|| json!({ "type": "pong", "at": now() }).to_string())
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.bus.subscribe();

    if sender.send(Message::Text(hello_frame().into())).await.is_err() {
        return;
    }
    tracing::debug!(subscribers = state.bus.subscriber_count(), "realtime client connected");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            received = events.recv() => match received {
                Ok(envelope) => {
                    let frame = match serde_json::to_string(&envelope) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!(event = %envelope.event, error = %e, "failed to serialize event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "realtime client lagged, skipping missed events");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = client_reply(&text)
                        && sender.send(Message::Text(reply.into())).await.is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::debug!("realtime client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_frame_announces_connection() {
        let hello: serde_json::Value = serde_json::from_str(&hello_frame()).unwrap();
        assert_eq!(hello["type"], "hello");
        assert_eq!(hello["msg"], "realtime_connected");
        assert!(hello["at"].is_string());
    }

    #[test]
    fn ping_gets_pong() {
        let reply = client_reply(r#"{"type":"ping"}"#).unwrap();
        let reply: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["type"], "pong");
    }

    #[test]
    fn other_frames_are_ignored() {
        assert!(client_reply(r#"{"type":"subscribe"}"#).is_none());
        assert!(client_reply("not json").is_none());
    }
}
