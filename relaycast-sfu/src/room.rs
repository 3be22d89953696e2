//! SFU room (router)

use crate::types::RtpCapabilities;
use chrono::{DateTime, Utc};
use relaycast_core::RoomId;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-room router mediating producers and consumers.
///
/// Created lazily on first use and idempotently returned afterwards;
/// the capability set never changes over a room's lifetime.
#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    capabilities: RtpCapabilities,
    closed: AtomicBool,
    pub created_at: DateTime<Utc>,
}

impl Room {
    #[must_use]
    pub fn new(id: RoomId, capabilities: RtpCapabilities) -> Self {
        Self {
            id,
            capabilities,
            closed: AtomicBool::new(false),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn capabilities(&self) -> &RtpCapabilities {
        &self.capabilities
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the room closed. Returns false if it already was.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}
