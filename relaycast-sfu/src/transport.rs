//! Transports owned by a room

use crate::types::{DtlsParameters, IceCandidate, IceParameters, TransportDirection};
use parking_lot::Mutex;
use relaycast_core::{Error, Result, RoomId, TransportId};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};

/// How media reaches a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// ICE/DTLS negotiated with a client
    WebRtc,
    /// RTP relayed to a fixed local UDP endpoint (recording bridge)
    Plain,
}

/// A single transport. WebRTC transports carry ICE/DTLS parameters and
/// complete their handshake through [`Transport::connect`]; plain
/// transports are born connected to their relay endpoint.
#[derive(Debug)]
pub struct Transport {
    pub id: TransportId,
    pub room_id: RoomId,
    pub direction: TransportDirection,
    kind: TransportKind,
    ice_parameters: Option<IceParameters>,
    ice_candidates: Vec<IceCandidate>,
    dtls_parameters: Option<DtlsParameters>,
    remote_dtls: Mutex<Option<DtlsParameters>>,
    relay_endpoint: Option<(String, u16)>,
    connected: AtomicBool,
    closed: AtomicBool,
}

/// Connection parameters handed to the client that owns a transport
#[derive(Debug, Clone, Serialize)]
pub struct TransportDescription {
    pub id: TransportId,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
}

impl Transport {
    pub fn new_webrtc(
        id: TransportId,
        room_id: RoomId,
        direction: TransportDirection,
        ice_parameters: IceParameters,
        ice_candidates: Vec<IceCandidate>,
        dtls_parameters: DtlsParameters,
    ) -> Self {
        Self {
            id,
            room_id,
            direction,
            kind: TransportKind::WebRtc,
            ice_parameters: Some(ice_parameters),
            ice_candidates,
            dtls_parameters: Some(dtls_parameters),
            remote_dtls: Mutex::new(None),
            relay_endpoint: None,
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// A plain RTP transport relaying to `ip:port`, connected on creation
    pub fn new_plain(id: TransportId, room_id: RoomId, ip: String, port: u16) -> Self {
        Self {
            id,
            room_id,
            direction: TransportDirection::Recv,
            kind: TransportKind::Plain,
            ice_parameters: None,
            ice_candidates: Vec::new(),
            dtls_parameters: None,
            remote_dtls: Mutex::new(None),
            relay_endpoint: Some((ip, port)),
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Complete the DTLS handshake with the client's parameters.
    ///
    /// Fails on plain transports and on a second connect attempt.
    pub fn connect(&self, remote_dtls: DtlsParameters) -> Result<()> {
        if self.kind != TransportKind::WebRtc {
            return Err(Error::InvalidInput(format!(
                "transport {} is not a WebRTC transport",
                self.id
            )));
        }
        if self.connected.swap(true, Ordering::SeqCst) {
            return Err(Error::NegotiationFailed(format!(
                "transport {} is already connected",
                self.id
            )));
        }
        *self.remote_dtls.lock() = Some(remote_dtls);
        Ok(())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn relay_endpoint(&self) -> Option<&(String, u16)> {
        self.relay_endpoint.as_ref()
    }

    /// Connection parameters for the client side. `None` for plain
    /// transports, which no client ever connects to.
    #[must_use]
    pub fn describe(&self) -> Option<TransportDescription> {
        Some(TransportDescription {
            id: self.id.clone(),
            ice_parameters: self.ice_parameters.clone()?,
            ice_candidates: self.ice_candidates.clone(),
            dtls_parameters: self.dtls_parameters.clone()?,
        })
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the transport closed. Returns false if it already was.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}
