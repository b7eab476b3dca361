pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use handlers::ConnBinding;

/// Normalize a network origin for duplicate-vote detection: first entry of a
/// comma-separated forwarding chain, trimmed, with any IPv4-in-IPv6 prefix
/// stripped. Applied consistently everywhere, or dedup silently degrades.
pub fn normalize_origin(raw: &str) -> String {
    let first = raw.split(',').next().unwrap_or(raw).trim();
    first.strip_prefix("::ffff:").unwrap_or(first).to_string()
}

/// Origin fingerprint for a new connection: the forwarded client address if
/// present, the transport peer address otherwise.
fn origin_fingerprint(headers: &HeaderMap, peer: SocketAddr) -> String {
    let raw = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string());
    normalize_origin(&raw)
}

#[derive(Debug, PartialEq, Eq)]
enum HeartbeatAction {
    Ping,
    Terminate,
}

/// Liveness bookkeeping for one heartbeat cycle. A pong between cycles sets
/// `alive` back to true; a full cycle without one terminates the connection.
fn heartbeat_due(alive: &mut bool) -> HeartbeatAction {
    if !*alive {
        return HeartbeatAction::Terminate;
    }
    *alive = false;
    HeartbeatAction::Ping
}

/// Drop the connection's registry entry once its socket task ends, whatever
/// the reason (client close, transport error, missed heartbeat).
async fn release_binding(state: &AppState, binding: &ConnBinding) {
    if let Some(room) = &binding.room_code {
        state.registry.unbind(room, &binding.connection_id).await;
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let origin = origin_fingerprint(&headers, peer);
    ws.on_upgrade(move |socket| handle_socket(socket, origin, state))
}

/// Handle one WebSocket connection for its whole lifetime.
///
/// The connection's binding lives on this task's stack and dies with it.
/// Outbound traffic (direct replies and room broadcasts alike) flows through
/// one mpsc channel so ordering is preserved.
async fn handle_socket(socket: WebSocket, origin: String, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = tokio::sync::mpsc::unbounded_channel::<ServerMessage>();

    let connection_id = ulid::Ulid::new().to_string();
    let mut binding = ConnBinding::new(connection_id.clone());
    tracing::info!(connection = %connection_id, origin = %origin, "client connected");

    let mut heartbeat = tokio::time::interval(Duration::from_secs(state.config.heartbeat_secs));
    heartbeat.tick().await; // first tick completes immediately
    let mut alive = true;

    loop {
        tokio::select! {
            // Outbound: replies and broadcasts queued for this connection
            outbound = out_rx.recv() => {
                match outbound {
                    Some(msg) => {
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => break,
                }
            }

            // Liveness: one unanswered ping cycle closes the connection
            _ = heartbeat.tick() => {
                match heartbeat_due(&mut alive) {
                    HeartbeatAction::Terminate => {
                        tracing::info!(connection = %connection_id, "terminating unresponsive client");
                        break;
                    }
                    HeartbeatAction::Ping => {
                        if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                            break;
                        }
                    }
                }
            }

            // Inbound client events
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(connection = %connection_id, "received message: {}", text);
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => {
                                handlers::handle_message(msg, &mut binding, &out_tx, Some(&origin), &state)
                                    .await;
                            }
                            Err(e) => {
                                // Malformed or unrecognized: logged, ignored,
                                // connection stays open.
                                tracing::warn!(connection = %connection_id, error = %e, "ignoring unparseable message");
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        alive = true;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!(connection = %connection_id, "WebSocket closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(connection = %connection_id, "WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    release_binding(&state, &binding).await;
    tracing::info!(connection = %connection_id, "client disconnected");
}
