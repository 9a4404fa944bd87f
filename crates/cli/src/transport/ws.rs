// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket handler for the bridge protocol.
//!
//! Each connection registers as a hub observer, receives `connected` and the
//! current `sessions` list, then multiplexes broadcasts, targeted replies,
//! and inbound requests in one `select!` loop.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use crate::error::ErrorCode;
use crate::hub::Disconnect;
use crate::transport::handler::handle_client_message;
use crate::transport::state::AppState;
use crate::transport::ws_msg::{ws_error, ClientMessage, ServerMessage};

/// WebSocket upgrade handler.
pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(state, socket))
}

/// Per-connection event loop.
async fn handle_connection(state: Arc<AppState>, socket: WebSocket) {
    let observer = state.hub.register();
    let id = observer.id;
    let mut events = observer.events;
    let mut replies = observer.replies;
    info!(observer = id, clients = state.hub.observer_count(), "client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let greeting = [ServerMessage::Connected { port: state.config.port }, state.sessions_msg()];
    for msg in &greeting {
        if send_json(&mut ws_tx, msg).await.is_err() {
            state.hub.unregister(id);
            return;
        }
    }

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            frame = state.hub.next_broadcast(id, &mut events) => {
                match frame {
                    Ok(frame) => {
                        if send_text(&mut ws_tx, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(Disconnect::Lagged(skipped)) => {
                        warn!(observer = id, skipped, "observer fell behind broadcasts, closing");
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                    Err(Disconnect::Closed) => break,
                }
            }
            frame = replies.recv() => {
                let Some(frame) = frame else { break };
                if send_text(&mut ws_tx, &frame).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(_)) | None => break,
                };

                match msg {
                    Message::Text(text) => {
                        let client_msg: ClientMessage = match serde_json::from_str(&text) {
                            Ok(m) => m,
                            Err(e) => {
                                warn!(observer = id, "malformed message: {e}");
                                let err = ws_error(ErrorCode::BadRequest, ErrorCode::BadRequest.default_message());
                                if send_json(&mut ws_tx, &err).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                        };

                        if let Some(reply) = handle_client_message(&state, id, client_msg).await {
                            if send_json(&mut ws_tx, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    // Cleanup
    state.hub.unregister(id);
    info!(observer = id, clients = state.hub.observer_count(), "client disconnected");
}

/// Send a JSON-serialized message over the WebSocket.
async fn send_json<S>(tx: &mut S, msg: &ServerMessage) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = match serde_json::to_string(msg) {
        Ok(t) => t,
        Err(_) => return Err(()),
    };
    send_text(tx, &text).await
}

/// Send an already-serialized frame.
async fn send_text<S>(tx: &mut S, text: &str) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}
