//! HLS playback endpoints
//!
//! Serves the playlists and segments ffmpeg writes under the HLS root.
//! Only `.m3u8` and `.ts` files are reachable, path segments are
//! validated against traversal, and playlists are never cached so live
//! players always see the newest window.

use axum::{
    extract::{Path as UrlPath, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::path::Path;
use tracing::debug;

use crate::http::{AppError, AppResult, AppState};

/// HLS router
pub fn create_hls_router() -> Router<AppState> {
    Router::new().route("/hls/{room_id}/{file}", get(serve_hls_file))
}

/// Serve one HLS artifact for a room
///
/// Path: `GET /hls/{room_id}/{file}`
pub async fn serve_hls_file(
    State(state): State<AppState>,
    UrlPath((room_id, file)): UrlPath<(String, String)>,
) -> AppResult<impl IntoResponse> {
    if !valid_segment(&room_id) || !valid_segment(&file) {
        return Err(AppError::not_found("no such file"));
    }
    let Some((content_type, cache_control)) = file_headers(&file) else {
        return Err(AppError::not_found("no such file"));
    };

    let path = Path::new(&state.config.recording.hls_root)
        .join(&room_id)
        .join(&file);
    let bytes = tokio::fs::read(&path).await.map_err(|err| {
        debug!(path = %path.display(), error = %err, "HLS file not readable");
        AppError::not_found("no such file")
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    // Tells buffering reverse proxies to pass segments through as written
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );

    Ok((StatusCode::OK, headers, bytes))
}

/// A single safe path segment: no separators, no parent references
fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.contains('/')
        && !segment.contains('\\')
        && !segment.contains("..")
}

/// Content type and cache policy by file kind; `None` for anything that
/// is not an HLS artifact
fn file_headers(file: &str) -> Option<(&'static str, &'static str)> {
    if file.ends_with(".m3u8") {
        // Live playlists change every segment; never cache them
        Some((
            "application/vnd.apple.mpegurl",
            "no-cache, no-store, must-revalidate",
        ))
    } else if file.ends_with(".ts") {
        // Segments are written once and expire out of the window
        Some(("video/mp2t", "public, max-age=90"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaycast_core::Config;
    use relaycast_session::{ChatChannel, SignalingHub};
    use std::sync::Arc;
    use std::time::Instant;

    fn state_with_root(hls_root: &str) -> AppState {
        let mut config = Config::default();
        config.recording.hls_root = hls_root.to_string();
        AppState {
            config: Arc::new(config),
            hub: Arc::new(SignalingHub::new()),
            chat: Arc::new(ChatChannel::new()),
            sfu: None,
            recording: None,
            started_at: Instant::now(),
        }
    }

    #[test]
    fn test_segment_validation() {
        assert!(valid_segment("room-abc123"));
        assert!(valid_segment("stream.m3u8"));
        assert!(!valid_segment(""));
        assert!(!valid_segment("../secrets"));
        assert!(!valid_segment("a/b"));
        assert!(!valid_segment("a\\b"));
    }

    #[test]
    fn test_only_hls_artifacts_are_served() {
        assert!(file_headers("stream.m3u8").is_some());
        assert!(file_headers("segment0001.ts").is_some());
        assert!(file_headers("input.sdp").is_none());
        assert!(file_headers("notes.txt").is_none());
    }

    #[tokio::test]
    async fn test_serves_playlist_with_no_cache_headers() {
        let dir = tempfile::tempdir().unwrap();
        let room_dir = dir.path().join("r1");
        std::fs::create_dir_all(&room_dir).unwrap();
        std::fs::write(room_dir.join("stream.m3u8"), "#EXTM3U\n").unwrap();

        let state = state_with_root(dir.path().to_str().unwrap());
        let response = serve_hls_file(
            State(state),
            UrlPath(("r1".to_string(), "stream.m3u8".to_string())),
        )
        .await
        .unwrap()
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap(),
            "application/vnd.apple.mpegurl"
        );
        assert_eq!(
            headers.get(header::CACHE_CONTROL).unwrap(),
            "no-cache, no-store, must-revalidate"
        );
        assert_eq!(headers.get("x-accel-buffering").unwrap(), "no");
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_root(dir.path().to_str().unwrap());

        let err = serve_hls_file(
            State(state),
            UrlPath(("r1".to_string(), "stream.m3u8".to_string())),
        )
        .await
        .err()
        .expect("missing file should 404");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with_root(dir.path().to_str().unwrap());

        let err = serve_hls_file(
            State(state),
            UrlPath(("..".to_string(), "stream.m3u8".to_string())),
        )
        .await
        .err()
        .expect("traversal should be rejected");
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
