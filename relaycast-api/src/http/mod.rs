// Module: http
// HTTP/JSON and WebSocket API surface

pub mod chat;
pub mod error;
pub mod health;
pub mod hls;
pub mod sfu;
pub mod signaling;

use axum::Router;
use relaycast_core::Config;
use relaycast_session::{ChatChannel, SignalingHub};
use relaycast_sfu::{RecordingManager, SfuManager};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Arc<SignalingHub>,
    pub chat: Arc<ChatChannel>,
    /// Absent when the SFU is disabled in configuration
    pub sfu: Option<Arc<SfuManager>>,
    pub recording: Option<Arc<RecordingManager>>,
    pub started_at: Instant,
}

/// Create the HTTP router with all routes
pub fn create_router(
    config: Arc<Config>,
    hub: Arc<SignalingHub>,
    chat: Arc<ChatChannel>,
    sfu: Option<Arc<SfuManager>>,
    recording: Option<Arc<RecordingManager>>,
) -> Router {
    let state = AppState {
        config,
        hub,
        chat,
        sfu,
        recording,
        started_at: Instant::now(),
    };

    let router = Router::new()
        // Health check endpoints (for monitoring probes)
        .merge(health::create_health_router())
        // WebSocket signaling per room
        .merge(signaling::create_signaling_router())
        // WebSocket chat per room
        .merge(chat::create_chat_router())
        // SFU control plane
        .merge(sfu::create_sfu_router())
        // HLS playback of recordings
        .merge(hls::create_hls_router());

    // Apply layers before state
    let router = router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Apply state to all routes (must be last)
    router.with_state(state)
}
