//! SFU control plane HTTP endpoints
//!
//! JSON API driving the SFU registries: room and transport creation,
//! producing, consuming, and the HLS recording bridge. Every endpoint
//! returns 503 while the SFU is disabled in configuration.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use relaycast_core::{ConsumerId, ProducerId, RoomId, TransportId};
use relaycast_sfu::{
    DtlsParameters, MediaKind, RecordingManager, RtpCapabilities, RtpParameters, SfuManager,
    SfuStats, TransportDirection,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::http::{AppError, AppResult, AppState};

/// SFU control plane router
pub fn create_sfu_router() -> Router<AppState> {
    Router::new()
        .route("/api/sfu/create-room", post(create_room))
        .route("/api/sfu/create-transport", post(create_transport))
        .route("/api/sfu/connect-transport", post(connect_transport))
        .route("/api/sfu/produce", post(produce))
        .route("/api/sfu/consume", post(consume))
        .route("/api/sfu/resume-consumer", post(resume_consumer))
        .route("/api/sfu/start-hls", post(start_hls))
        .route("/api/sfu/stop-hls", post(stop_hls))
        .route("/api/sfu/stats", get(get_stats))
}

fn sfu(state: &AppState) -> AppResult<&Arc<SfuManager>> {
    state
        .sfu
        .as_ref()
        .ok_or_else(|| AppError::service_unavailable("SFU is not enabled"))
}

fn recording(state: &AppState) -> AppResult<&Arc<RecordingManager>> {
    state
        .recording
        .as_ref()
        .ok_or_else(|| AppError::service_unavailable("Recording is not enabled"))
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub room_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateRoomResponse {
    pub router_rtp_capabilities: RtpCapabilities,
}

/// Create a room (idempotent) and return its router capabilities
///
/// Path: `POST /api/sfu/create-room`
pub async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> AppResult<impl IntoResponse> {
    let sfu = sfu(&state)?;
    let room_id = RoomId::from_string(req.room_id);

    let room = sfu.create_or_get_room(&room_id)?;
    Ok(Json(CreateRoomResponse {
        router_rtp_capabilities: room.capabilities().clone(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateTransportRequest {
    pub room_id: String,
    /// "send" to publish, "recv" to subscribe; defaults to send
    #[serde(default = "default_direction")]
    pub direction: TransportDirection,
}

fn default_direction() -> TransportDirection {
    TransportDirection::Send
}

/// Create a WebRTC transport in a room
///
/// Path: `POST /api/sfu/create-transport`
///
/// Returns the transport id plus the ICE and DTLS parameters the client
/// needs to connect. 404 if the room does not exist.
pub async fn create_transport(
    State(state): State<AppState>,
    Json(req): Json<CreateTransportRequest>,
) -> AppResult<impl IntoResponse> {
    let sfu = sfu(&state)?;
    let room_id = RoomId::from_string(req.room_id);

    let transport = sfu.create_transport(&room_id, req.direction)?;
    let description = transport
        .describe()
        .ok_or_else(|| AppError::internal_server_error("transport has no description"))?;
    Ok(Json(description))
}

#[derive(Debug, Deserialize)]
pub struct ConnectTransportRequest {
    pub transport_id: String,
    pub dtls_parameters: DtlsParameters,
}

#[derive(Debug, Serialize)]
pub struct ConnectTransportResponse {
    pub connected: bool,
}

/// Complete a transport's DTLS handshake
///
/// Path: `POST /api/sfu/connect-transport`
pub async fn connect_transport(
    State(state): State<AppState>,
    Json(req): Json<ConnectTransportRequest>,
) -> AppResult<impl IntoResponse> {
    let sfu = sfu(&state)?;
    let transport_id = TransportId::from_string(req.transport_id);

    sfu.connect_transport(&transport_id, req.dtls_parameters)?;
    Ok(Json(ConnectTransportResponse { connected: true }))
}

#[derive(Debug, Deserialize)]
pub struct ProduceRequest {
    pub room_id: String,
    pub transport_id: String,
    pub kind: String,
    pub rtp_parameters: RtpParameters,
}

#[derive(Debug, Serialize)]
pub struct ProduceResponse {
    pub id: ProducerId,
}

/// Publish a track through a transport
///
/// Path: `POST /api/sfu/produce`
pub async fn produce(
    State(state): State<AppState>,
    Json(req): Json<ProduceRequest>,
) -> AppResult<impl IntoResponse> {
    let sfu = sfu(&state)?;
    let room_id = RoomId::from_string(req.room_id);
    let transport_id = TransportId::from_string(req.transport_id);
    let kind: MediaKind = req.kind.parse()?;

    let producer = sfu.produce(&room_id, &transport_id, kind, req.rtp_parameters)?;
    Ok(Json(ProduceResponse {
        id: producer.id.clone(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ConsumeRequest {
    pub room_id: String,
    pub transport_id: String,
    pub producer_id: String,
    pub rtp_capabilities: RtpCapabilities,
}

#[derive(Debug, Serialize)]
pub struct ConsumeResponse {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
}

/// Subscribe to a producer's media
///
/// Path: `POST /api/sfu/consume`
///
/// 400 if the offered capabilities cannot consume the producer; the
/// consumer is created paused and must be resumed explicitly.
pub async fn consume(
    State(state): State<AppState>,
    Json(req): Json<ConsumeRequest>,
) -> AppResult<impl IntoResponse> {
    let sfu = sfu(&state)?;
    let room_id = RoomId::from_string(req.room_id);
    let transport_id = TransportId::from_string(req.transport_id);
    let producer_id = ProducerId::from_string(req.producer_id);

    let consumer = sfu.consume(&room_id, &transport_id, &producer_id, &req.rtp_capabilities)?;
    Ok(Json(ConsumeResponse {
        id: consumer.id.clone(),
        producer_id: consumer.producer_id.clone(),
        kind: consumer.kind,
        rtp_parameters: consumer.rtp_parameters().clone(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ResumeConsumerRequest {
    pub consumer_id: String,
}

#[derive(Debug, Serialize)]
pub struct ResumeConsumerResponse {
    pub resumed: bool,
}

/// Unpause a consumer
///
/// Path: `POST /api/sfu/resume-consumer`
pub async fn resume_consumer(
    State(state): State<AppState>,
    Json(req): Json<ResumeConsumerRequest>,
) -> AppResult<impl IntoResponse> {
    let sfu = sfu(&state)?;
    let consumer_id = ConsumerId::from_string(req.consumer_id);

    sfu.resume_consumer(&consumer_id)?;
    Ok(Json(ResumeConsumerResponse { resumed: true }))
}

#[derive(Debug, Deserialize)]
pub struct StartHlsRequest {
    pub room_id: String,
}

#[derive(Debug, Serialize)]
pub struct StartHlsResponse {
    pub hls_url: String,
}

/// Start recording a room to HLS
///
/// Path: `POST /api/sfu/start-hls`
///
/// Requires at least one live producer in the room; a second start for
/// the same room replaces the running recording.
pub async fn start_hls(
    State(state): State<AppState>,
    Json(req): Json<StartHlsRequest>,
) -> AppResult<impl IntoResponse> {
    let recording = recording(&state)?;
    let room_id = RoomId::from_string(req.room_id);

    let hls_url = recording.start_hls(&room_id).await?;
    Ok(Json(StartHlsResponse { hls_url }))
}

#[derive(Debug, Deserialize)]
pub struct StopHlsRequest {
    pub room_id: String,
}

#[derive(Debug, Serialize)]
pub struct StopHlsResponse {
    pub stopped: bool,
}

/// Stop a room's HLS recording
///
/// Path: `POST /api/sfu/stop-hls`
pub async fn stop_hls(
    State(state): State<AppState>,
    Json(req): Json<StopHlsRequest>,
) -> AppResult<impl IntoResponse> {
    let recording = recording(&state)?;
    let room_id = RoomId::from_string(req.room_id);

    let stopped = recording.stop_hls(&room_id).await;
    Ok(Json(StopHlsResponse { stopped }))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub sfu: SfuStats,
    pub recordings: usize,
}

/// Registry counts
///
/// Path: `GET /api/sfu/stats`
pub async fn get_stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let sfu = sfu(&state)?;
    let recordings = state.recording.as_ref().map_or(0, |r| r.job_count());

    Ok(Json(StatsResponse {
        sfu: sfu.stats(),
        recordings,
    }))
}
