//! Producers: inbound media registered under a transport

use crate::types::{MediaKind, RtpParameters};
use chrono::{DateTime, Utc};
use relaycast_core::{ProducerId, RoomId, TransportId};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub struct Producer {
    pub id: ProducerId,
    pub room_id: RoomId,
    pub transport_id: TransportId,
    pub kind: MediaKind,
    rtp_parameters: RtpParameters,
    closed: AtomicBool,
    pub created_at: DateTime<Utc>,
}

impl Producer {
    #[must_use]
    pub fn new(
        id: ProducerId,
        room_id: RoomId,
        transport_id: TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Self {
        Self {
            id,
            room_id,
            transport_id,
            kind,
            rtp_parameters,
            closed: AtomicBool::new(false),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn rtp_parameters(&self) -> &RtpParameters {
        &self.rtp_parameters
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the producer closed. Returns false if it already was.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}
