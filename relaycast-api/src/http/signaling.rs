//! WebSocket signaling endpoint
//!
//! One socket per client per room. The hub assigns roles, relays SDP and
//! ICE point-to-point, and fans out presence updates; SFU control verbs
//! are handled inline and answered on the same socket.

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
use relaycast_core::{ClientId, ConsumerId, Error, ProducerId, Result, RoomId, TransportId};
use relaycast_session::{Role, SignalingMessage};
use relaycast_sfu::{
    DtlsParameters, MediaKind, RtpCapabilities, RtpParameters, SfuManager, TransportDirection,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::http::AppState;

/// Signaling router
pub fn create_signaling_router() -> Router<AppState> {
    Router::new().route("/api/rooms/{room_id}/signaling", get(signaling_handler))
}

/// WebSocket handler for room signaling
///
/// Path: `GET /api/rooms/{room_id}/signaling`
///
/// The first frame a client receives is `role_assignment`; with the SFU
/// enabled it is followed by `transport_created` for the client's
/// direction (send for the broadcaster, recv for viewers).
pub async fn signaling_handler(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    // Limit max message size to 64KB (default is far larger than any signaling frame)
    ws.max_message_size(64 * 1024)
        .on_upgrade(move |socket| handle_socket(socket, state, room_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, room_id: String) {
    let room_id = RoomId::from_string(room_id);
    let (client_id, role, mut rx) = state.hub.join(&room_id);

    info!(
        room_id = %room_id,
        client_id = %client_id,
        role = %role,
        "Signaling connection established"
    );

    // Greet directly on the socket so these frames precede anything the
    // join already queued for us (viewer counts, presence).
    for message in greeting(&state, &room_id, &client_id, role) {
        match serde_json::to_string(&message) {
            Ok(json) => {
                if socket.send(Message::Text(json.into())).await.is_err() {
                    state.hub.leave(&room_id, &client_id);
                    return;
                }
            }
            Err(e) => error!("Failed to encode signaling message: {}", e),
        }
    }

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Forward hub messages to the socket
    let forward_client = client_id.clone();
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        debug!(client_id = %forward_client, "Socket gone, stopping forward task");
                        break;
                    }
                }
                Err(e) => error!("Failed to encode signaling message: {}", e),
            }
        }
    });

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<SignalingMessage>(&text) {
                Ok(message) => handle_message(&state, &room_id, &client_id, role, message),
                Err(err) => {
                    debug!(client_id = %client_id, error = %err, "Unparseable signaling frame");
                    state.hub.send_to(
                        &room_id,
                        &client_id,
                        SignalingMessage::error(format!("unrecognized message: {err}")),
                    );
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // binary, ping and pong frames are ignored
            Err(err) => {
                debug!(client_id = %client_id, error = %err, "Signaling socket error");
                break;
            }
        }
    }

    state.hub.leave(&room_id, &client_id);
    info!(room_id = %room_id, client_id = %client_id, "Signaling connection closed");
}

/// Messages sent to a client immediately after it joins
fn greeting(
    state: &AppState,
    room_id: &RoomId,
    client_id: &ClientId,
    role: Role,
) -> Vec<SignalingMessage> {
    let mut messages = Vec::with_capacity(2);

    let mut router_capabilities = None;
    if let Some(sfu) = &state.sfu {
        match sfu.create_or_get_room(room_id) {
            Ok(room) => {
                router_capabilities = serde_json::to_value(room.capabilities()).ok();
            }
            Err(err) => {
                warn!(room_id = %room_id, error = %err, "Failed to prepare SFU room");
            }
        }
    }
    messages.push(SignalingMessage::RoleAssignment {
        client_id: client_id.clone(),
        role,
        router_capabilities,
    });

    if let Some(sfu) = &state.sfu {
        let direction = if role.is_broadcaster() {
            TransportDirection::Send
        } else {
            TransportDirection::Recv
        };
        match sfu.create_transport(room_id, direction) {
            Ok(transport) => {
                if let Some(description) = transport.describe() {
                    messages.push(SignalingMessage::TransportCreated {
                        id: description.id,
                        ice_parameters: serde_json::to_value(&description.ice_parameters)
                            .unwrap_or(Value::Null),
                        ice_candidates: serde_json::to_value(&description.ice_candidates)
                            .unwrap_or(Value::Null),
                        dtls_parameters: serde_json::to_value(&description.dtls_parameters)
                            .unwrap_or(Value::Null),
                    });
                }
            }
            Err(err) => {
                warn!(room_id = %room_id, error = %err, "Failed to create transport");
            }
        }
    }

    messages
}

/// Route one decoded client frame
fn handle_message(
    state: &AppState,
    room_id: &RoomId,
    client_id: &ClientId,
    role: Role,
    message: SignalingMessage,
) {
    match message {
        msg @ (SignalingMessage::Offer { .. }
        | SignalingMessage::Answer { .. }
        | SignalingMessage::Candidate { .. }) => {
            // Unknown targets are dropped, not errored; the peer may
            // simply have left between frames
            if !state.hub.relay(room_id, client_id, msg) {
                debug!(room_id = %room_id, from = %client_id, "Dropped signal for unknown target");
            }
        }
        SignalingMessage::RequestViewers => {
            if role.is_broadcaster() {
                let viewer_ids = state.hub.viewer_ids(room_id);
                state
                    .hub
                    .send_to(room_id, client_id, SignalingMessage::ViewerList { viewer_ids });
            } else {
                state.hub.send_to(
                    room_id,
                    client_id,
                    SignalingMessage::error("only the broadcaster can list viewers"),
                );
            }
        }
        SignalingMessage::Produce {
            transport_id,
            kind,
            rtp_parameters,
        } => {
            let reply = handle_produce(state, room_id, &transport_id, &kind, rtp_parameters)
                .unwrap_or_else(SignalingMessage::error);
            state.hub.send_to(room_id, client_id, reply);
        }
        SignalingMessage::Consume {
            transport_id,
            producer_id,
            rtp_capabilities,
        } => {
            let reply = handle_consume(state, room_id, &transport_id, &producer_id, rtp_capabilities)
                .unwrap_or_else(SignalingMessage::error);
            state.hub.send_to(room_id, client_id, reply);
        }
        SignalingMessage::ConnectTransport {
            transport_id,
            dtls_parameters,
        } => {
            let reply = handle_connect(state, &transport_id, dtls_parameters)
                .unwrap_or_else(SignalingMessage::error);
            state.hub.send_to(room_id, client_id, reply);
        }
        SignalingMessage::Resume { consumer_id } => {
            if let Err(err) = handle_resume(state, &consumer_id) {
                state
                    .hub
                    .send_to(room_id, client_id, SignalingMessage::error(err));
            }
        }
        // Server-originated kinds arriving from a client are ignored
        other => {
            debug!(
                client_id = %client_id,
                kind = other.message_type(),
                "Ignoring client frame"
            );
        }
    }
}

fn sfu_enabled(state: &AppState) -> Result<&Arc<SfuManager>> {
    state
        .sfu
        .as_ref()
        .ok_or_else(|| Error::Internal("SFU is not enabled".to_string()))
}

fn handle_produce(
    state: &AppState,
    room_id: &RoomId,
    transport_id: &TransportId,
    kind: &str,
    rtp_parameters: Value,
) -> Result<SignalingMessage> {
    let sfu = sfu_enabled(state)?;
    let kind: MediaKind = kind.parse()?;
    let rtp_parameters: RtpParameters = serde_json::from_value(rtp_parameters)?;

    let producer = sfu.produce(room_id, transport_id, kind, rtp_parameters)?;
    Ok(SignalingMessage::Produced {
        id: producer.id.clone(),
    })
}

fn handle_consume(
    state: &AppState,
    room_id: &RoomId,
    transport_id: &TransportId,
    producer_id: &ProducerId,
    rtp_capabilities: Value,
) -> Result<SignalingMessage> {
    let sfu = sfu_enabled(state)?;
    let rtp_capabilities: RtpCapabilities = serde_json::from_value(rtp_capabilities)?;

    let consumer = sfu.consume(room_id, transport_id, producer_id, &rtp_capabilities)?;
    Ok(SignalingMessage::Consumed {
        id: consumer.id.clone(),
        producer_id: consumer.producer_id.clone(),
        kind: consumer.kind.to_string(),
        rtp_parameters: serde_json::to_value(consumer.rtp_parameters())?,
    })
}

fn handle_connect(
    state: &AppState,
    transport_id: &TransportId,
    dtls_parameters: Value,
) -> Result<SignalingMessage> {
    let sfu = sfu_enabled(state)?;
    let dtls_parameters: DtlsParameters = serde_json::from_value(dtls_parameters)?;

    sfu.connect_transport(transport_id, dtls_parameters)?;
    Ok(SignalingMessage::TransportConnected {
        transport_id: transport_id.clone(),
    })
}

fn handle_resume(state: &AppState, consumer_id: &ConsumerId) -> Result<()> {
    let sfu = sfu_enabled(state)?;
    sfu.resume_consumer(consumer_id)
}
