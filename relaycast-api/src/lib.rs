// RelayCast API Library
//
// HTTP and WebSocket surface for RelayCast: signaling, chat, the SFU
// control plane, HLS playback, and health.

pub mod http;

// Re-export commonly used types
pub use http::{create_router, AppState};
