mod server;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use relaycast_core::{load_config, logging};
use relaycast_session::{ChatChannel, SignalingHub};
use relaycast_sfu::{RecordingManager, SfuConfig, SfuManager};

use server::{RelayCastServer, Services};

#[derive(Parser, Debug)]
#[command(name = "relaycast")]
#[command(about = "RelayCast broadcast session coordinator", long_about = None)]
struct Args {
    /// Config file path (falls back to ./config.toml, then
    /// /etc/relaycast/config.toml, then environment variables only)
    #[arg(long, env = "RELAYCAST_CONFIG_PATH")]
    config: Option<String>,

    /// Listen address override as host:port
    #[arg(long, env = "RELAYCAST_LISTEN")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration (validated on load, fails fast)
    let mut config = load_config(args.config.as_deref())?;

    if let Some(listen) = &args.listen {
        let (host, port) = listen
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("--listen expects host:port, got {listen:?}"))?;
        config.server.host = host.to_string();
        config.server.http_port = port
            .parse()
            .map_err(|e| anyhow::anyhow!("--listen port {port:?} is invalid: {e}"))?;
    }

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("RelayCast server starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Signaling hub and chat fan-out (always on)
    let hub = Arc::new(SignalingHub::new());
    let chat = Arc::new(ChatChannel::new());

    // 4. SFU control plane (optional)
    let sfu_manager = if config.sfu.enabled {
        let sfu_config = SfuConfig {
            max_rooms: config.sfu.max_rooms,
            listen_ip: config.sfu.listen_ip.clone(),
            announced_ip: config.sfu.announced_ip.clone(),
            rtc_min_port: config.sfu.rtc_min_port,
            rtc_max_port: config.sfu.rtc_max_port,
            video_rtp_port: config.recording.video_rtp_port,
            audio_rtp_port: config.recording.audio_rtp_port,
            hls_root: config.recording.hls_root.clone(),
            ffmpeg_path: config.recording.ffmpeg_path.clone(),
        };
        Some(SfuManager::new(sfu_config))
    } else {
        info!("SFU disabled, mesh signaling only");
        None
    };

    // 5. Recording bridge (optional, rides on the SFU)
    let recording_manager = if config.recording.enabled {
        match &sfu_manager {
            Some(sfu) => Some(Arc::new(RecordingManager::new(Arc::clone(sfu)))),
            None => {
                warn!("Recording enabled but the SFU is disabled, recording bridge unavailable");
                None
            }
        }
    } else {
        info!("Recording bridge disabled");
        None
    };

    // 6. Start the server and wait for shutdown
    let services = Services {
        hub,
        chat,
        sfu_manager,
        recording_manager,
    };
    let server = RelayCastServer::new(config, services);
    server.start().await?;

    Ok(())
}
