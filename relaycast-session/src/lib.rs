//! Session coordination for RelayCast
//!
//! This crate owns everything that happens between a client joining a room
//! and media flowing: role assignment over the signaling channel, the mesh
//! peer negotiation state machine with candidate queueing, readiness polling
//! for local capture, and per-room chat fan-out.

pub mod capture;
pub mod chat;
pub mod hub;
pub mod message;
pub mod peer;

pub use capture::{CaptureAdapter, CaptureConfig, MediaSource, TrackInfo};
pub use chat::{ChatChannel, ChatMessage};
pub use hub::{SignalingHub, Subscriber};
pub use message::{CandidateInit, Role, SignalingMessage};
pub use peer::{
    NegotiationState, PeerConnector, PeerConnectorFactory, PeerLink, PeerLinkRegistry,
};
