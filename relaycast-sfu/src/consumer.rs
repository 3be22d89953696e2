//! Consumers: outbound media fed by a producer
//!
//! Consumers are created paused so the client can wire up its receiving
//! side before media flows; an explicit resume unpauses them.

use crate::types::{MediaKind, RtpParameters};
use relaycast_core::{ConsumerId, ProducerId, RoomId, TransportId};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
pub struct Consumer {
    pub id: ConsumerId,
    pub room_id: RoomId,
    pub transport_id: TransportId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    rtp_parameters: RtpParameters,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl Consumer {
    #[must_use]
    pub fn new(
        id: ConsumerId,
        room_id: RoomId,
        transport_id: TransportId,
        producer_id: ProducerId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Self {
        Self {
            id,
            room_id,
            transport_id,
            producer_id,
            kind,
            rtp_parameters,
            paused: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn rtp_parameters(&self) -> &RtpParameters {
        &self.rtp_parameters
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the consumer closed. Returns false if it already was.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}
