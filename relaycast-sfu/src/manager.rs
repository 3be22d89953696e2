//! SFU resource registries
//!
//! The manager owns every room, transport, producer, and consumer, keyed
//! by id in concurrent maps. All mutating operations look their objects
//! up first and fail with `NotFound` when absent; closes cascade to the
//! resources the closed object owns and are idempotent no-ops for
//! unknown ids. Registries are the sole source of truth: a closed
//! resource is also removed from its map.

use crate::config::SfuConfig;
use crate::consumer::Consumer;
use crate::producer::Producer;
use crate::room::Room;
use crate::transport::Transport;
use crate::types::{
    can_consume, DtlsFingerprint, DtlsParameters, IceCandidate, IceParameters, MediaKind,
    RtpCapabilities, RtpParameters, TransportDirection,
};
use crate::worker::Worker;
use dashmap::DashMap;
use relaycast_core::{ConsumerId, Error, ProducerId, Result, RoomId, TransportId};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const HEX_CHARS: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F',
];

/// Registry counts, served by the stats endpoint
#[derive(Debug, Clone, Serialize, Default)]
pub struct SfuStats {
    pub rooms: usize,
    pub transports: usize,
    pub producers: usize,
    pub consumers: usize,
}

pub struct SfuManager {
    config: SfuConfig,
    worker: Arc<Worker>,
    rooms: DashMap<RoomId, Arc<Room>>,
    transports: DashMap<TransportId, Arc<Transport>>,
    producers: DashMap<ProducerId, Arc<Producer>>,
    consumers: DashMap<ConsumerId, Arc<Consumer>>,
    /// Rolling cursor over the RTC port range for synthesized candidates
    port_cursor: AtomicU32,
}

impl SfuManager {
    pub fn new(config: SfuConfig) -> Arc<Self> {
        info!(
            max_rooms = config.max_rooms,
            listen_ip = %config.listen_ip,
            rtc_min_port = config.rtc_min_port,
            rtc_max_port = config.rtc_max_port,
            "SFU manager initialized"
        );

        Arc::new(Self {
            config,
            worker: Arc::new(Worker::new()),
            rooms: DashMap::new(),
            transports: DashMap::new(),
            producers: DashMap::new(),
            consumers: DashMap::new(),
            port_cursor: AtomicU32::new(0),
        })
    }

    #[must_use]
    pub fn config(&self) -> &SfuConfig {
        &self.config
    }

    #[must_use]
    pub fn worker(&self) -> Arc<Worker> {
        Arc::clone(&self.worker)
    }

    fn ensure_worker(&self) -> Result<()> {
        if self.worker.is_alive() {
            Ok(())
        } else {
            Err(Error::WorkerDied(
                self.worker
                    .death_reason()
                    .unwrap_or_else(|| "worker unavailable".to_string()),
            ))
        }
    }

    /// Get or create a room. Creation is idempotent: a second call with
    /// the same id returns the existing room and its capability set.
    pub fn create_or_get_room(&self, room_id: &RoomId) -> Result<Arc<Room>> {
        self.ensure_worker()?;

        if let Some(room) = self.rooms.get(room_id) {
            debug!(room_id = %room_id, "Room already exists");
            return Ok(Arc::clone(room.value()));
        }

        // Enforce room limit (0 = unlimited)
        if self.config.max_rooms > 0 && self.rooms.len() >= self.config.max_rooms {
            warn!(
                current_rooms = self.rooms.len(),
                max_rooms = self.config.max_rooms,
                "Room limit reached"
            );
            return Err(Error::Internal(format!(
                "room limit ({}) reached",
                self.config.max_rooms
            )));
        }

        let room = Arc::new(Room::new(
            room_id.clone(),
            RtpCapabilities::router_default(),
        ));
        self.rooms.insert(room_id.clone(), Arc::clone(&room));

        info!(
            room_id = %room_id,
            total_rooms = self.rooms.len(),
            "Created room"
        );
        Ok(room)
    }

    #[must_use]
    pub fn room(&self, room_id: &RoomId) -> Option<Arc<Room>> {
        self.rooms.get(room_id).map(|r| Arc::clone(r.value()))
    }

    pub fn router_capabilities(&self, room_id: &RoomId) -> Result<RtpCapabilities> {
        let room = self
            .rooms
            .get(room_id)
            .ok_or_else(|| Error::NotFound(format!("room {room_id} not found")))?;
        Ok(room.capabilities().clone())
    }

    /// Create a WebRTC transport in a room and synthesize its connection
    /// parameters.
    pub fn create_transport(
        &self,
        room_id: &RoomId,
        direction: TransportDirection,
    ) -> Result<Arc<Transport>> {
        self.ensure_worker()?;

        if !self.rooms.contains_key(room_id) {
            return Err(Error::NotFound(format!("room {room_id} not found")));
        }

        let id = TransportId::new();
        let ice_parameters = IceParameters {
            username_fragment: nanoid::nanoid!(16),
            password: nanoid::nanoid!(32),
            ice_lite: true,
        };
        let ice_candidates = vec![IceCandidate {
            foundation: "udpcandidate".to_string(),
            priority: 1_076_302_079,
            ip: self.config.public_ip().to_string(),
            port: self.allocate_port(),
            protocol: "udp".to_string(),
            candidate_type: "host".to_string(),
        }];
        let dtls_parameters = DtlsParameters {
            role: Some("auto".to_string()),
            fingerprints: vec![DtlsFingerprint {
                algorithm: "sha-256".to_string(),
                value: Self::generate_fingerprint(),
            }],
        };

        let transport = Arc::new(Transport::new_webrtc(
            id.clone(),
            room_id.clone(),
            direction,
            ice_parameters,
            ice_candidates,
            dtls_parameters,
        ));
        self.transports.insert(id.clone(), Arc::clone(&transport));

        debug!(room_id = %room_id, transport_id = %id, direction = ?direction, "Created transport");
        Ok(transport)
    }

    /// Create a plain RTP transport relaying a room's media to a fixed
    /// local endpoint (recording bridge).
    pub fn create_plain_transport(
        &self,
        room_id: &RoomId,
        ip: &str,
        port: u16,
    ) -> Result<Arc<Transport>> {
        self.ensure_worker()?;

        if !self.rooms.contains_key(room_id) {
            return Err(Error::NotFound(format!("room {room_id} not found")));
        }

        let id = TransportId::new();
        let transport = Arc::new(Transport::new_plain(
            id.clone(),
            room_id.clone(),
            ip.to_string(),
            port,
        ));
        self.transports.insert(id.clone(), Arc::clone(&transport));

        debug!(room_id = %room_id, transport_id = %id, ip, port, "Created plain transport");
        Ok(transport)
    }

    /// Complete a transport's DTLS handshake. A second connect fails
    /// with `NegotiationFailed`.
    pub fn connect_transport(
        &self,
        transport_id: &TransportId,
        dtls_parameters: DtlsParameters,
    ) -> Result<()> {
        let transport = self
            .transports
            .get(transport_id)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| Error::NotFound(format!("transport {transport_id} not found")))?;

        transport.connect(dtls_parameters)?;
        debug!(transport_id = %transport_id, "Transport connected");
        Ok(())
    }

    /// Register a producer under a transport. The room's previous
    /// producer of the same kind (if any) is closed first, so at most
    /// one producer per kind is live per room.
    pub fn produce(
        &self,
        room_id: &RoomId,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<Arc<Producer>> {
        self.ensure_worker()?;

        if !self.rooms.contains_key(room_id) {
            return Err(Error::NotFound(format!("room {room_id} not found")));
        }
        let transport = self
            .transports
            .get(transport_id)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| Error::NotFound(format!("transport {transport_id} not found")))?;
        if transport.room_id != *room_id {
            return Err(Error::InvalidInput(format!(
                "transport {transport_id} belongs to a different room"
            )));
        }

        let replaced: Vec<ProducerId> = self
            .producers
            .iter()
            .filter(|p| p.room_id == *room_id && p.kind == kind && !p.is_closed())
            .map(|p| p.id.clone())
            .collect();
        for previous in replaced {
            info!(
                room_id = %room_id,
                producer_id = %previous,
                kind = %kind,
                "Replacing previous producer"
            );
            self.close_producer(&previous);
        }

        let producer = Arc::new(Producer::new(
            ProducerId::new(),
            room_id.clone(),
            transport_id.clone(),
            kind,
            rtp_parameters,
        ));
        self.producers
            .insert(producer.id.clone(), Arc::clone(&producer));

        info!(
            room_id = %room_id,
            transport_id = %transport_id,
            producer_id = %producer.id,
            kind = %kind,
            "Producer created"
        );
        Ok(producer)
    }

    /// Register a consumer for a producer's media, paused.
    ///
    /// Fails with `IncompatibleCapabilities` (creating nothing) when the
    /// requester's capability set cannot consume the producer.
    pub fn consume(
        &self,
        room_id: &RoomId,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: &RtpCapabilities,
    ) -> Result<Arc<Consumer>> {
        self.ensure_worker()?;

        if !self.rooms.contains_key(room_id) {
            return Err(Error::NotFound(format!("room {room_id} not found")));
        }
        let transport = self
            .transports
            .get(transport_id)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| Error::NotFound(format!("transport {transport_id} not found")))?;
        if transport.room_id != *room_id {
            return Err(Error::InvalidInput(format!(
                "transport {transport_id} belongs to a different room"
            )));
        }
        let producer = self
            .producers
            .get(producer_id)
            .map(|p| Arc::clone(p.value()))
            .ok_or_else(|| Error::NotFound(format!("producer {producer_id} not found")))?;

        if !can_consume(rtp_capabilities, producer.rtp_parameters()) {
            return Err(Error::IncompatibleCapabilities(format!(
                "capabilities cannot consume producer {producer_id}"
            )));
        }

        let consumer = Arc::new(Consumer::new(
            ConsumerId::new(),
            room_id.clone(),
            transport_id.clone(),
            producer_id.clone(),
            producer.kind,
            producer.rtp_parameters().clone(),
        ));
        self.consumers
            .insert(consumer.id.clone(), Arc::clone(&consumer));

        debug!(
            room_id = %room_id,
            consumer_id = %consumer.id,
            producer_id = %producer_id,
            "Consumer created (paused)"
        );
        Ok(consumer)
    }

    /// Unpause a consumer so media starts flowing
    pub fn resume_consumer(&self, consumer_id: &ConsumerId) -> Result<()> {
        let consumer = self
            .consumers
            .get(consumer_id)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| Error::NotFound(format!("consumer {consumer_id} not found")))?;

        consumer.resume();
        debug!(consumer_id = %consumer_id, "Consumer resumed");
        Ok(())
    }

    /// Close a consumer. Unknown ids are a no-op.
    pub fn close_consumer(&self, consumer_id: &ConsumerId) {
        if let Some((_, consumer)) = self.consumers.remove(consumer_id) {
            consumer.close();
            debug!(consumer_id = %consumer_id, "Consumer closed");
        }
    }

    /// Close a producer and every consumer fed by it. Unknown ids are a
    /// no-op.
    pub fn close_producer(&self, producer_id: &ProducerId) {
        let Some((_, producer)) = self.producers.remove(producer_id) else {
            return;
        };
        producer.close();

        let fed: Vec<ConsumerId> = self
            .consumers
            .iter()
            .filter(|c| c.producer_id == *producer_id)
            .map(|c| c.id.clone())
            .collect();
        for consumer_id in &fed {
            self.close_consumer(consumer_id);
        }

        info!(
            producer_id = %producer_id,
            consumers_closed = fed.len(),
            "Producer closed"
        );
    }

    /// Close a transport and everything it owns. Unknown ids are a
    /// no-op.
    pub fn close_transport(&self, transport_id: &TransportId) {
        let Some((_, transport)) = self.transports.remove(transport_id) else {
            return;
        };
        transport.close();

        let owned_producers: Vec<ProducerId> = self
            .producers
            .iter()
            .filter(|p| p.transport_id == *transport_id)
            .map(|p| p.id.clone())
            .collect();
        for producer_id in owned_producers {
            self.close_producer(&producer_id);
        }

        let owned_consumers: Vec<ConsumerId> = self
            .consumers
            .iter()
            .filter(|c| c.transport_id == *transport_id)
            .map(|c| c.id.clone())
            .collect();
        for consumer_id in owned_consumers {
            self.close_consumer(&consumer_id);
        }

        info!(transport_id = %transport_id, "Transport closed");
    }

    /// Close a room and cascade to every transport (and through them,
    /// every producer and consumer) under it. Unknown ids are a no-op.
    pub fn close_room(&self, room_id: &RoomId) {
        let Some((_, room)) = self.rooms.remove(room_id) else {
            return;
        };
        room.close();

        let owned: Vec<TransportId> = self
            .transports
            .iter()
            .filter(|t| t.room_id == *room_id)
            .map(|t| t.id.clone())
            .collect();
        for transport_id in owned {
            self.close_transport(&transport_id);
        }

        info!(room_id = %room_id, "Room closed");
    }

    /// A room's live producers, at most one per kind, for the recording
    /// bridge: (video, audio).
    #[must_use]
    pub fn recording_producers(
        &self,
        room_id: &RoomId,
    ) -> (Option<Arc<Producer>>, Option<Arc<Producer>>) {
        let mut video = None;
        let mut audio = None;
        for producer in self.producers.iter() {
            if producer.room_id != *room_id || producer.is_closed() {
                continue;
            }
            match producer.kind {
                MediaKind::Video => video = Some(Arc::clone(producer.value())),
                MediaKind::Audio => audio = Some(Arc::clone(producer.value())),
            }
        }
        (video, audio)
    }

    #[must_use]
    pub fn stats(&self) -> SfuStats {
        SfuStats {
            rooms: self.rooms.len(),
            transports: self.transports.len(),
            producers: self.producers.len(),
            consumers: self.consumers.len(),
        }
    }

    /// Close every room (used on shutdown)
    pub fn shutdown(&self) {
        let rooms: Vec<RoomId> = self.rooms.iter().map(|r| r.id.clone()).collect();
        let count = rooms.len();
        for room_id in rooms {
            self.close_room(&room_id);
        }
        info!(rooms_closed = count, "SFU manager shut down");
    }

    fn allocate_port(&self) -> u16 {
        let min = self.config.rtc_min_port;
        let max = self.config.rtc_max_port.max(min);
        let span = u32::from(max - min) + 1;
        let offset = self.port_cursor.fetch_add(1, Ordering::Relaxed) % span;
        min + offset as u16
    }

    fn generate_fingerprint() -> String {
        let raw: Vec<char> = nanoid::nanoid!(64, &HEX_CHARS).chars().collect();
        let mut out = String::with_capacity(raw.len() + raw.len() / 2);
        for (i, pair) in raw.chunks(2).enumerate() {
            if i > 0 {
                out.push(':');
            }
            out.extend(pair);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportKind;

    fn manager() -> Arc<SfuManager> {
        SfuManager::new(SfuConfig::default())
    }

    fn room_id(name: &str) -> RoomId {
        RoomId::from_string(name.to_string())
    }

    fn vp8_parameters() -> RtpParameters {
        RtpParameters {
            codecs: vec![crate::types::RtpCodecCapability {
                mime_type: "video/VP8".to_string(),
                clock_rate: 90000,
                channels: None,
                preferred_payload_type: None,
            }],
        }
    }

    fn opus_parameters() -> RtpParameters {
        RtpParameters {
            codecs: vec![crate::types::RtpCodecCapability {
                mime_type: "audio/opus".to_string(),
                clock_rate: 48000,
                channels: Some(2),
                preferred_payload_type: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_create_room_is_idempotent() {
        let sfu = manager();
        let r = room_id("r1");

        let first = sfu.create_or_get_room(&r).unwrap();
        let second = sfu.create_or_get_room(&r).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.capabilities(), second.capabilities());
        assert_eq!(sfu.stats().rooms, 1);
    }

    #[tokio::test]
    async fn test_room_limit_enforced() {
        let sfu = SfuManager::new(SfuConfig {
            max_rooms: 1,
            ..SfuConfig::default()
        });

        sfu.create_or_get_room(&room_id("r1")).unwrap();
        let err = sfu.create_or_get_room(&room_id("r2")).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));

        // The existing room is still returned
        assert!(sfu.create_or_get_room(&room_id("r1")).is_ok());
    }

    #[tokio::test]
    async fn test_create_transport_requires_room() {
        let sfu = manager();
        let err = sfu
            .create_transport(&room_id("ghost"), TransportDirection::Send)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_transport_connect_once() {
        let sfu = manager();
        let r = room_id("r1");
        sfu.create_or_get_room(&r).unwrap();

        let transport = sfu.create_transport(&r, TransportDirection::Send).unwrap();
        let description = transport.describe().unwrap();
        assert!(description.ice_parameters.ice_lite);
        assert_eq!(description.ice_candidates.len(), 1);

        let dtls = DtlsParameters {
            role: Some("client".to_string()),
            fingerprints: vec![DtlsFingerprint {
                algorithm: "sha-256".to_string(),
                value: "AA:BB".to_string(),
            }],
        };
        sfu.connect_transport(&transport.id, dtls.clone()).unwrap();
        assert!(transport.is_connected());

        let err = sfu.connect_transport(&transport.id, dtls).unwrap_err();
        assert!(matches!(err, Error::NegotiationFailed(_)));
    }

    #[tokio::test]
    async fn test_produce_replaces_previous_of_same_kind() {
        let sfu = manager();
        let r = room_id("r1");
        sfu.create_or_get_room(&r).unwrap();
        let transport = sfu.create_transport(&r, TransportDirection::Send).unwrap();

        let first = sfu
            .produce(&r, &transport.id, MediaKind::Video, vp8_parameters())
            .unwrap();
        let second = sfu
            .produce(&r, &transport.id, MediaKind::Video, vp8_parameters())
            .unwrap();

        assert!(first.is_closed());
        assert_eq!(sfu.stats().producers, 1);

        let (video, _) = sfu.recording_producers(&r);
        assert_eq!(video.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_produce_keeps_other_kind() {
        let sfu = manager();
        let r = room_id("r1");
        sfu.create_or_get_room(&r).unwrap();
        let transport = sfu.create_transport(&r, TransportDirection::Send).unwrap();

        sfu.produce(&r, &transport.id, MediaKind::Video, vp8_parameters())
            .unwrap();
        sfu.produce(&r, &transport.id, MediaKind::Audio, opus_parameters())
            .unwrap();

        assert_eq!(sfu.stats().producers, 2);
        let (video, audio) = sfu.recording_producers(&r);
        assert!(video.is_some());
        assert!(audio.is_some());
    }

    #[tokio::test]
    async fn test_produce_rejects_foreign_transport() {
        let sfu = manager();
        let r1 = room_id("r1");
        let r2 = room_id("r2");
        sfu.create_or_get_room(&r1).unwrap();
        sfu.create_or_get_room(&r2).unwrap();
        let foreign = sfu.create_transport(&r2, TransportDirection::Send).unwrap();

        let err = sfu
            .produce(&r1, &foreign.id, MediaKind::Video, vp8_parameters())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_consume_incompatible_creates_nothing() {
        let sfu = manager();
        let r = room_id("r1");
        sfu.create_or_get_room(&r).unwrap();
        let send = sfu.create_transport(&r, TransportDirection::Send).unwrap();
        let recv = sfu.create_transport(&r, TransportDirection::Recv).unwrap();
        let producer = sfu
            .produce(&r, &send.id, MediaKind::Video, vp8_parameters())
            .unwrap();

        let h264_only = RtpCapabilities {
            codecs: vec![crate::types::RtpCodecCapability {
                mime_type: "video/H264".to_string(),
                clock_rate: 90000,
                channels: None,
                preferred_payload_type: None,
            }],
        };

        let err = sfu
            .consume(&r, &recv.id, &producer.id, &h264_only)
            .unwrap_err();
        assert!(matches!(err, Error::IncompatibleCapabilities(_)));
        assert_eq!(sfu.stats().consumers, 0);
    }

    #[tokio::test]
    async fn test_consume_starts_paused_and_resumes() {
        let sfu = manager();
        let r = room_id("r1");
        sfu.create_or_get_room(&r).unwrap();
        let send = sfu.create_transport(&r, TransportDirection::Send).unwrap();
        let recv = sfu.create_transport(&r, TransportDirection::Recv).unwrap();
        let producer = sfu
            .produce(&r, &send.id, MediaKind::Video, vp8_parameters())
            .unwrap();

        let consumer = sfu
            .consume(&r, &recv.id, &producer.id, &RtpCapabilities::router_default())
            .unwrap();
        assert!(consumer.is_paused());
        assert_eq!(consumer.kind, MediaKind::Video);

        sfu.resume_consumer(&consumer.id).unwrap();
        assert!(!consumer.is_paused());

        let err = sfu
            .resume_consumer(&ConsumerId::from_string("ghost".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_close_transport_cascades() {
        let sfu = manager();
        let r = room_id("r1");
        sfu.create_or_get_room(&r).unwrap();
        let send = sfu.create_transport(&r, TransportDirection::Send).unwrap();
        let recv = sfu.create_transport(&r, TransportDirection::Recv).unwrap();
        let producer = sfu
            .produce(&r, &send.id, MediaKind::Video, vp8_parameters())
            .unwrap();
        let consumer = sfu
            .consume(&r, &recv.id, &producer.id, &RtpCapabilities::router_default())
            .unwrap();

        sfu.close_transport(&send.id);

        assert!(producer.is_closed());
        // The consumer was fed by the closed producer
        assert!(consumer.is_closed());
        let stats = sfu.stats();
        assert_eq!(stats.transports, 1);
        assert_eq!(stats.producers, 0);
        assert_eq!(stats.consumers, 0);

        // Closing again is a no-op
        sfu.close_transport(&send.id);
    }

    #[tokio::test]
    async fn test_close_producer_closes_its_consumers() {
        let sfu = manager();
        let r = room_id("r1");
        sfu.create_or_get_room(&r).unwrap();
        let send = sfu.create_transport(&r, TransportDirection::Send).unwrap();
        let recv = sfu.create_transport(&r, TransportDirection::Recv).unwrap();
        let producer = sfu
            .produce(&r, &send.id, MediaKind::Video, vp8_parameters())
            .unwrap();
        let consumer = sfu
            .consume(&r, &recv.id, &producer.id, &RtpCapabilities::router_default())
            .unwrap();

        sfu.close_producer(&producer.id);

        assert!(consumer.is_closed());
        assert_eq!(sfu.stats().consumers, 0);
        // The transports survive
        assert_eq!(sfu.stats().transports, 2);
    }

    #[tokio::test]
    async fn test_close_room_cascades_everything() {
        let sfu = manager();
        let r = room_id("r1");
        let room = sfu.create_or_get_room(&r).unwrap();
        let send = sfu.create_transport(&r, TransportDirection::Send).unwrap();
        sfu.produce(&r, &send.id, MediaKind::Video, vp8_parameters())
            .unwrap();

        sfu.close_room(&r);

        assert!(room.is_closed());
        let stats = sfu.stats();
        assert_eq!(stats.rooms, 0);
        assert_eq!(stats.transports, 0);
        assert_eq!(stats.producers, 0);

        // Closing an already-closed room is a no-op
        sfu.close_room(&r);
    }

    #[tokio::test]
    async fn test_worker_death_fails_mutating_operations() {
        let sfu = manager();
        sfu.worker().mark_died("test kill");

        let err = sfu.create_or_get_room(&room_id("r1")).unwrap_err();
        assert!(matches!(err, Error::WorkerDied(_)));
    }

    #[tokio::test]
    async fn test_plain_transport_is_born_connected() {
        let sfu = manager();
        let r = room_id("r1");
        sfu.create_or_get_room(&r).unwrap();

        let plain = sfu.create_plain_transport(&r, "127.0.0.1", 12000).unwrap();
        assert_eq!(plain.kind(), TransportKind::Plain);
        assert!(plain.is_connected());
        assert_eq!(
            plain.relay_endpoint(),
            Some(&("127.0.0.1".to_string(), 12000))
        );
        assert!(plain.describe().is_none());

        // A client cannot DTLS-connect a plain transport
        let err = sfu
            .connect_transport(
                &plain.id,
                DtlsParameters {
                    role: None,
                    fingerprints: Vec::new(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_ports_stay_in_range() {
        let sfu = SfuManager::new(SfuConfig {
            rtc_min_port: 40000,
            rtc_max_port: 40002,
            ..SfuConfig::default()
        });
        let r = room_id("r1");
        sfu.create_or_get_room(&r).unwrap();

        for _ in 0..10 {
            let transport = sfu.create_transport(&r, TransportDirection::Recv).unwrap();
            let port = transport.describe().unwrap().ice_candidates[0].port;
            assert!((40000..=40002).contains(&port));
        }
    }
}
