//! WebSocket chat endpoint
//!
//! Joining clients get a welcome envelope with their assigned id and the
//! room's recent history, then a stream of chat messages. The sender id
//! on outgoing messages is always the connection's own id; clients only
//! supply text.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use relaycast_core::{ClientId, RoomId};
use relaycast_session::ChatMessage;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::http::AppState;

/// First frame sent to a joining chat client
#[derive(Debug, Serialize)]
struct Welcome<'a> {
    client_id: &'a ClientId,
    history: &'a [ChatMessage],
}

/// Frame a chat client sends
#[derive(Debug, Deserialize)]
struct Outgoing {
    text: String,
}

/// Chat router
pub fn create_chat_router() -> Router<AppState> {
    Router::new().route("/api/rooms/{room_id}/chat", get(chat_handler))
}

/// WebSocket handler for room chat
///
/// Path: `GET /api/rooms/{room_id}/chat`
pub async fn chat_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.max_message_size(64 * 1024)
        .on_upgrade(move |socket| handle_socket(socket, state, room_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, room_id: String) {
    let room_id = RoomId::from_string(room_id);
    let (client_id, mut rx, history) = state.chat.join(&room_id);

    info!(room_id = %room_id, client_id = %client_id, "Chat connection established");

    let welcome = Welcome {
        client_id: &client_id,
        history: &history,
    };
    match serde_json::to_string(&welcome) {
        Ok(json) => {
            if socket.send(Message::Text(json.into())).await.is_err() {
                state.chat.leave(&room_id, &client_id);
                return;
            }
        }
        Err(e) => error!("Failed to encode chat welcome: {}", e),
    }

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Forward room messages to the socket
    let forward_client = client_id.clone();
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        debug!(client_id = %forward_client, "Socket gone, stopping chat forward task");
                        break;
                    }
                }
                Err(e) => error!("Failed to encode chat message: {}", e),
            }
        }
    });

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<Outgoing>(&text) {
                Ok(outgoing) if !outgoing.text.trim().is_empty() => {
                    state.chat.say(&room_id, &client_id, outgoing.text);
                }
                Ok(_) => {} // blank messages are dropped
                Err(err) => {
                    debug!(client_id = %client_id, error = %err, "Unparseable chat frame");
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // binary, ping and pong frames are ignored
            Err(err) => {
                debug!(client_id = %client_id, error = %err, "Chat socket error");
                break;
            }
        }
    }

    state.chat.leave(&room_id, &client_id);
    info!(room_id = %room_id, client_id = %client_id, "Chat connection closed");
}
