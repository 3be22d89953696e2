//! Signaling message types
//!
//! Every frame on the signaling WebSocket is one of these variants, tagged
//! by a `type` field. Point-to-point kinds carry `from`/`to` client ids;
//! the hub overwrites `from` with the sender's real id before relaying so
//! a client cannot impersonate another.

use relaycast_core::{ClientId, ConsumerId, ProducerId, TransportId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role assigned to a client within a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Broadcaster,
    Viewer,
}

impl Role {
    #[must_use]
    pub const fn is_broadcaster(&self) -> bool {
        matches!(self, Self::Broadcaster)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Broadcaster => write!(f, "broadcaster"),
            Self::Viewer => write!(f, "viewer"),
        }
    }
}

/// ICE candidate as received from a peer
///
/// `sdp_mid` / `sdp_m_line_index` are optional in the wire format; an
/// end-of-candidates marker carries an empty `candidate` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInit {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

/// Messages exchanged over the signaling channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalingMessage {
    /// Sent once by the server immediately after a client connects
    RoleAssignment {
        client_id: ClientId,
        role: Role,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        router_capabilities: Option<Value>,
    },

    /// Tells the broadcaster that a viewer joined and wants an offer
    NewViewer { viewer_id: ClientId },

    /// SDP offer, relayed point-to-point
    Offer {
        sdp: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ClientId>,
        to: ClientId,
    },

    /// SDP answer, relayed point-to-point
    Answer {
        sdp: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ClientId>,
        to: ClientId,
    },

    /// ICE candidate, relayed point-to-point
    Candidate {
        candidate: CandidateInit,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ClientId>,
        to: ClientId,
    },

    /// Current number of viewers in the room, broadcast on join/leave
    ViewerCount { count: usize },

    /// Broadcast to viewers when the broadcaster disconnects
    BroadcastEnded,

    /// Broadcaster asks for the current viewer list
    RequestViewers,

    /// Reply to `request_viewers`
    ViewerList { viewer_ids: Vec<ClientId> },

    /// Server-created transport parameters (SFU mode)
    TransportCreated {
        id: TransportId,
        ice_parameters: Value,
        ice_candidates: Value,
        dtls_parameters: Value,
    },

    /// Client asks to publish a track through a transport (SFU mode)
    Produce {
        transport_id: TransportId,
        kind: String,
        rtp_parameters: Value,
    },

    /// Reply to `produce`
    Produced { id: ProducerId },

    /// Client asks to receive a producer's media (SFU mode)
    Consume {
        transport_id: TransportId,
        producer_id: ProducerId,
        rtp_capabilities: Value,
    },

    /// Reply to `consume`; the consumer starts paused
    Consumed {
        id: ConsumerId,
        producer_id: ProducerId,
        kind: String,
        rtp_parameters: Value,
    },

    /// Client asks to unpause a consumer (SFU mode)
    Resume { consumer_id: ConsumerId },

    /// Client completes the DTLS handshake for a transport (SFU mode)
    ConnectTransport {
        transport_id: TransportId,
        dtls_parameters: Value,
    },

    /// Reply to `connect_transport`
    TransportConnected { transport_id: TransportId },

    /// Terminal error reply for a failed request
    Error { message: String },
}

impl SignalingMessage {
    /// Get the message type as a string (for logging)
    #[must_use]
    pub const fn message_type(&self) -> &'static str {
        match self {
            Self::RoleAssignment { .. } => "role_assignment",
            Self::NewViewer { .. } => "new_viewer",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::Candidate { .. } => "candidate",
            Self::ViewerCount { .. } => "viewer_count",
            Self::BroadcastEnded => "broadcast_ended",
            Self::RequestViewers => "request_viewers",
            Self::ViewerList { .. } => "viewer_list",
            Self::TransportCreated { .. } => "transport_created",
            Self::Produce { .. } => "produce",
            Self::Produced { .. } => "produced",
            Self::Consume { .. } => "consume",
            Self::Consumed { .. } => "consumed",
            Self::Resume { .. } => "resume",
            Self::ConnectTransport { .. } => "connect_transport",
            Self::TransportConnected { .. } => "transport_connected",
            Self::Error { .. } => "error",
        }
    }

    /// Target client for point-to-point kinds, `None` for everything else
    #[must_use]
    pub const fn target(&self) -> Option<&ClientId> {
        match self {
            Self::Offer { to, .. } | Self::Answer { to, .. } | Self::Candidate { to, .. } => {
                Some(to)
            }
            _ => None,
        }
    }

    /// Overwrite the claimed sender with the connection's real client id
    pub fn set_from(&mut self, sender: ClientId) {
        match self {
            Self::Offer { from, .. } | Self::Answer { from, .. } | Self::Candidate { from, .. } => {
                *from = Some(sender);
            }
            _ => {}
        }
    }

    /// Build an `error` reply from any error value
    #[must_use]
    pub fn error(err: impl std::fmt::Display) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }
}
