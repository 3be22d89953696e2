//! SFU configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SfuConfig {
    /// Maximum concurrent rooms (0 = unlimited)
    pub max_rooms: usize,
    /// Local IP media transports bind to
    pub listen_ip: String,
    /// IP announced in ICE candidates (falls back to `listen_ip`)
    pub announced_ip: Option<String>,
    /// RTC port range
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
    /// Fixed local RTP relay port for the recording video stream
    pub video_rtp_port: u16,
    /// Fixed local RTP relay port for the recording audio stream
    pub audio_rtp_port: u16,
    /// Root directory for per-room HLS output
    pub hls_root: String,
    /// ffmpeg binary the recording bridge spawns
    pub ffmpeg_path: String,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            max_rooms: 0,
            listen_ip: "127.0.0.1".to_string(),
            announced_ip: None,
            rtc_min_port: 40000,
            rtc_max_port: 49999,
            video_rtp_port: 12000,
            audio_rtp_port: 13000,
            hls_root: "./hls".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl SfuConfig {
    /// IP clients are told to reach the SFU on
    #[must_use]
    pub fn public_ip(&self) -> &str {
        self.announced_ip.as_deref().unwrap_or(&self.listen_ip)
    }
}
