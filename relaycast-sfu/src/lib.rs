//! SFU control plane for RelayCast
//!
//! Authoritative registries of rooms, transports, producers, and
//! consumers, plus the recording bridge that feeds a room's producers
//! into an external ffmpeg process for HLS output. This layer carries
//! SDP/ICE/DTLS payloads opaquely; it never touches media bytes.

pub mod config;
pub mod consumer;
pub mod manager;
pub mod producer;
pub mod recording;
pub mod room;
pub mod transport;
pub mod types;
pub mod worker;

pub use config::SfuConfig;
pub use consumer::Consumer;
pub use manager::{SfuManager, SfuStats};
pub use producer::Producer;
pub use recording::RecordingManager;
pub use room::Room;
pub use transport::{Transport, TransportDescription, TransportKind};
pub use types::{
    can_consume, DtlsFingerprint, DtlsParameters, IceCandidate, IceParameters, MediaKind,
    RtpCapabilities, RtpCodecCapability, RtpParameters, TransportDirection,
};
pub use worker::Worker;
