//! HLS recording bridge
//!
//! Bridges a room's live producers out of the SFU and into an ffmpeg
//! child process that writes an HLS playlist. Media leaves the SFU over
//! plain RTP transports bound to fixed local ports; ffmpeg picks the
//! streams up through a generated SDP file. One recording per room; a
//! second start replaces the first.

use crate::manager::SfuManager;
use crate::producer::Producer;
use crate::room::Room;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use relaycast_core::{Error, Result, RoomId, TransportId};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

const VIDEO_PAYLOAD_TYPE: u8 = 101;
const AUDIO_PAYLOAD_TYPE: u8 = 96;
const SDP_FILE_NAME: &str = "input.sdp";
const PLAYLIST_NAME: &str = "stream.m3u8";
const STOP_WAIT: Duration = Duration::from_secs(5);

/// A running ffmpeg recording for one room
struct RecordingJob {
    /// Distinguishes this job from a replacement for the same room
    job_id: String,
    room_id: RoomId,
    started_at: DateTime<Utc>,
    transport_ids: Vec<TransportId>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    done: watch::Sender<bool>,
}

impl RecordingJob {
    /// Ask the monitor task to kill ffmpeg. Returns false if stop was
    /// already requested.
    fn signal_stop(&self) -> bool {
        match self.kill_tx.lock().take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

pub struct RecordingManager {
    sfu: Arc<SfuManager>,
    jobs: Arc<DashMap<RoomId, Arc<RecordingJob>>>,
    /// Serializes `start_hls` per room: the replace check and the job
    /// insert are separated by awaits, and two racing starts must not
    /// both spawn ffmpeg against the same playlist.
    start_locks: DashMap<RoomId, Arc<AsyncMutex<()>>>,
}

impl RecordingManager {
    pub fn new(sfu: Arc<SfuManager>) -> Self {
        Self {
            sfu,
            jobs: Arc::new(DashMap::new()),
            start_locks: DashMap::new(),
        }
    }

    /// Start recording a room to HLS and return the playlist path.
    ///
    /// Requires at least one live producer. If the room is already
    /// being recorded the previous job is stopped first so the fixed
    /// RTP ports are free for the new one.
    pub async fn start_hls(&self, room_id: &RoomId) -> Result<String> {
        validate_room_segment(room_id)?;

        let start_lock = Arc::clone(&self.start_locks.entry(room_id.clone()).or_default());
        let _start_guard = start_lock.lock().await;

        let room = self
            .sfu
            .room(room_id)
            .ok_or_else(|| Error::NotFound(format!("room {room_id} not found")))?;
        let (video, audio) = self.sfu.recording_producers(room_id);
        if video.is_none() && audio.is_none() {
            return Err(Error::NotFound(format!(
                "room {room_id} has no producers to record"
            )));
        }

        if self.jobs.contains_key(room_id) {
            info!(room_id = %room_id, "Recording already running, replacing");
            self.stop_hls(room_id).await;
        }

        let config = self.sfu.config();
        let output_dir = Path::new(&config.hls_root).join(room_id.as_str());

        let mut transport_ids = Vec::new();
        let child = match self
            .provision(room_id, &room, video.as_ref(), audio.as_ref(), &output_dir, &mut transport_ids)
            .await
        {
            Ok(child) => child,
            Err(err) => {
                for transport_id in &transport_ids {
                    self.sfu.close_transport(transport_id);
                }
                return Err(err);
            }
        };

        let (kill_tx, kill_rx) = oneshot::channel();
        let (done, _) = watch::channel(false);
        let job = Arc::new(RecordingJob {
            job_id: nanoid::nanoid!(),
            room_id: room_id.clone(),
            started_at: Utc::now(),
            transport_ids,
            kill_tx: Mutex::new(Some(kill_tx)),
            done,
        });
        self.jobs.insert(room_id.clone(), Arc::clone(&job));

        tokio::spawn(monitor(
            child,
            kill_rx,
            job,
            Arc::clone(&self.sfu),
            Arc::clone(&self.jobs),
        ));

        let playlist = format!("/hls/{room_id}/{PLAYLIST_NAME}");
        info!(room_id = %room_id, playlist = %playlist, "Recording started");
        Ok(playlist)
    }

    /// Stop a room's recording and wait for its teardown. Returns false
    /// if nothing was recording.
    pub async fn stop_hls(&self, room_id: &RoomId) -> bool {
        let Some(job) = self.jobs.get(room_id).map(|j| Arc::clone(j.value())) else {
            return false;
        };

        job.signal_stop();

        let mut done_rx = job.done.subscribe();
        let finished = tokio::time::timeout(STOP_WAIT, done_rx.wait_for(|done| *done)).await;
        if finished.is_err() {
            warn!(room_id = %room_id, "Recording did not stop in time, forcing teardown");
            for transport_id in &job.transport_ids {
                self.sfu.close_transport(transport_id);
            }
            self.jobs
                .remove_if(room_id, |_, current| current.job_id == job.job_id);
        }
        true
    }

    /// Stop every recording (used on shutdown)
    pub async fn stop_all(&self) {
        let rooms: Vec<RoomId> = self.jobs.iter().map(|j| j.room_id.clone()).collect();
        for room_id in rooms {
            self.stop_hls(&room_id).await;
        }
    }

    #[must_use]
    pub fn is_recording(&self, room_id: &RoomId) -> bool {
        self.jobs.contains_key(room_id)
    }

    #[must_use]
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Create the plain transports and consumers feeding ffmpeg, write
    /// the SDP file, and spawn the process.
    async fn provision(
        &self,
        room_id: &RoomId,
        room: &Room,
        video: Option<&Arc<Producer>>,
        audio: Option<&Arc<Producer>>,
        output_dir: &Path,
        transport_ids: &mut Vec<TransportId>,
    ) -> Result<Child> {
        let config = self.sfu.config();
        let legs = [
            (video, config.video_rtp_port),
            (audio, config.audio_rtp_port),
        ];
        for (producer, port) in legs {
            let Some(producer) = producer else { continue };
            let transport = self
                .sfu
                .create_plain_transport(room_id, "127.0.0.1", port)?;
            transport_ids.push(transport.id.clone());
            let consumer = self
                .sfu
                .consume(room_id, &transport.id, &producer.id, room.capabilities())?;
            self.sfu.resume_consumer(&consumer.id)?;
            debug!(
                room_id = %room_id,
                kind = %producer.kind,
                port,
                "Recording leg ready"
            );
        }

        tokio::fs::create_dir_all(output_dir).await?;
        let sdp_path = output_dir.join(SDP_FILE_NAME);
        let sdp = build_sdp(config.video_rtp_port, config.audio_rtp_port);
        tokio::fs::write(&sdp_path, sdp).await?;

        let playlist_path = output_dir.join(PLAYLIST_NAME);
        let mut child = Command::new(&config.ffmpeg_path)
            .args(ffmpeg_args(&sdp_path, &playlist_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(stderr) = child.stderr.take() {
            let stderr_room = room_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if line.contains("Error") {
                        warn!(room_id = %stderr_room, "ffmpeg: {line}");
                    } else {
                        debug!(room_id = %stderr_room, "ffmpeg: {line}");
                    }
                }
            });
        }

        Ok(child)
    }
}

/// Waits for ffmpeg to exit (or be told to stop), then tears the job
/// down: SFU transports closed, registry entry removed, waiters woken.
async fn monitor(
    mut child: Child,
    mut kill_rx: oneshot::Receiver<()>,
    job: Arc<RecordingJob>,
    sfu: Arc<SfuManager>,
    jobs: Arc<DashMap<RoomId, Arc<RecordingJob>>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = &mut kill_rx => {
            if let Err(err) = child.start_kill() {
                warn!(room_id = %job.room_id, error = %err, "Failed to kill ffmpeg");
            }
            child.wait().await
        }
    };

    match status {
        Ok(exit) if exit.success() => {
            debug!(room_id = %job.room_id, "ffmpeg exited cleanly");
        }
        Ok(exit) => {
            warn!(room_id = %job.room_id, code = ?exit.code(), "ffmpeg exited");
        }
        Err(err) => {
            warn!(room_id = %job.room_id, error = %err, "Failed to reap ffmpeg");
        }
    }

    for transport_id in &job.transport_ids {
        sfu.close_transport(transport_id);
    }
    // Only remove ourselves; a replacement job may already own the slot
    jobs.remove_if(&job.room_id, |_, current| current.job_id == job.job_id);
    job.done.send_replace(true);

    let duration_secs = (Utc::now() - job.started_at).num_seconds();
    info!(room_id = %job.room_id, duration_secs, "Recording stopped");
}

/// SDP handed to ffmpeg. Both media sections are always present; a leg
/// without a producer simply never receives packets.
fn build_sdp(video_port: u16, audio_port: u16) -> String {
    format!(
        "v=0\n\
         o=- 0 0 IN IP4 127.0.0.1\n\
         s=RelayCast HLS\n\
         c=IN IP4 127.0.0.1\n\
         t=0 0\n\
         m=video {video_port} RTP/AVP {VIDEO_PAYLOAD_TYPE}\n\
         a=rtpmap:{VIDEO_PAYLOAD_TYPE} VP8/90000\n\
         m=audio {audio_port} RTP/AVP {AUDIO_PAYLOAD_TYPE}\n\
         a=rtpmap:{AUDIO_PAYLOAD_TYPE} opus/48000/2\n"
    )
}

fn ffmpeg_args(sdp_path: &Path, playlist_path: &Path) -> Vec<String> {
    vec![
        "-protocol_whitelist".to_string(),
        "file,rtp,udp".to_string(),
        "-fflags".to_string(),
        "+genpts".to_string(),
        "-i".to_string(),
        sdp_path.display().to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "ultrafast".to_string(),
        "-tune".to_string(),
        "zerolatency".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-f".to_string(),
        "hls".to_string(),
        "-hls_time".to_string(),
        "1".to_string(),
        "-hls_list_size".to_string(),
        "3".to_string(),
        "-hls_flags".to_string(),
        "delete_segments".to_string(),
        playlist_path.display().to_string(),
    ]
}

/// Room ids become a directory under the HLS root, so anything that
/// could escape it is rejected.
fn validate_room_segment(room_id: &RoomId) -> Result<()> {
    let raw = room_id.as_str();
    if raw.is_empty() || raw.contains('/') || raw.contains('\\') || raw.contains("..") {
        return Err(Error::InvalidInput(format!(
            "room id {raw:?} is not a valid path segment"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SfuConfig;
    use crate::types::{MediaKind, RtpCodecCapability, RtpParameters, TransportDirection};

    fn room_id(name: &str) -> RoomId {
        RoomId::from_string(name.to_string())
    }

    fn sfu_with_video_producer(hls_root: &Path, ffmpeg_path: &Path) -> (Arc<SfuManager>, RoomId) {
        let sfu = SfuManager::new(SfuConfig {
            hls_root: hls_root.display().to_string(),
            ffmpeg_path: ffmpeg_path.display().to_string(),
            ..SfuConfig::default()
        });
        let r = room_id("r1");
        sfu.create_or_get_room(&r).unwrap();
        let send = sfu.create_transport(&r, TransportDirection::Send).unwrap();
        sfu.produce(
            &r,
            &send.id,
            MediaKind::Video,
            RtpParameters {
                codecs: vec![RtpCodecCapability {
                    mime_type: "video/VP8".to_string(),
                    clock_rate: 90000,
                    channels: None,
                    preferred_payload_type: Some(101),
                }],
            },
        )
        .unwrap();
        (sfu, r)
    }

    #[cfg(unix)]
    fn write_stub(dir: &Path, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("ffmpeg-stub.sh");
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    /// Stub that logs its pid and then sits in ffmpeg's place until
    /// killed.
    #[cfg(unix)]
    fn long_running_stub(dir: &Path, log: &Path) -> std::path::PathBuf {
        write_stub(
            dir,
            &format!("#!/bin/sh\necho $$ >> {}\nexec sleep 600\n", log.display()),
        )
    }

    #[cfg(target_os = "linux")]
    async fn wait_for_pids(log: &Path, count: usize) -> Vec<String> {
        for _ in 0..50 {
            if let Ok(content) = std::fs::read_to_string(log) {
                let pids: Vec<String> = content.split_whitespace().map(str::to_string).collect();
                if pids.len() >= count {
                    return pids;
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("recorder stub never logged {count} pid(s)");
    }

    #[cfg(target_os = "linux")]
    fn pid_alive(pid: &str) -> bool {
        Path::new("/proc").join(pid).exists()
    }

    #[test]
    fn test_build_sdp_lists_both_media() {
        let sdp = build_sdp(12000, 13000);
        assert!(sdp.starts_with("v=0\n"));
        assert!(sdp.contains("m=video 12000 RTP/AVP 101"));
        assert!(sdp.contains("a=rtpmap:101 VP8/90000"));
        assert!(sdp.contains("m=audio 13000 RTP/AVP 96"));
        assert!(sdp.contains("a=rtpmap:96 opus/48000/2"));
    }

    #[test]
    fn test_ffmpeg_args_shape() {
        let args = ffmpeg_args(Path::new("/tmp/r/input.sdp"), Path::new("/tmp/r/stream.m3u8"));
        assert_eq!(args[0], "-protocol_whitelist");
        assert!(args.contains(&"-hls_time".to_string()));
        assert!(args.contains(&"delete_segments".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/r/stream.m3u8"));
    }

    #[test]
    fn test_room_segment_validation() {
        assert!(validate_room_segment(&room_id("abc-123")).is_ok());
        assert!(validate_room_segment(&room_id("../escape")).is_err());
        assert!(validate_room_segment(&room_id("a/b")).is_err());
        assert!(validate_room_segment(&room_id("")).is_err());
    }

    #[tokio::test]
    async fn test_start_requires_a_room() {
        let sfu = SfuManager::new(SfuConfig::default());
        let recording = RecordingManager::new(sfu);

        let err = recording.start_hls(&room_id("ghost")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_start_requires_producers() {
        let sfu = SfuManager::new(SfuConfig::default());
        let r = room_id("empty");
        sfu.create_or_get_room(&r).unwrap();
        let recording = RecordingManager::new(sfu);

        let err = recording.start_hls(&r).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(!recording.is_recording(&r));
    }

    #[tokio::test]
    async fn test_failed_spawn_releases_relay_transports() {
        let dir = tempfile::tempdir().unwrap();
        let (sfu, r) =
            sfu_with_video_producer(&dir.path().join("hls"), &dir.path().join("no-such-ffmpeg"));

        let recording = RecordingManager::new(Arc::clone(&sfu));
        let err = recording.start_hls(&r).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        // The plain relay transport (and its consumer) are gone; only
        // the broadcaster's send transport survives
        assert!(!recording.is_recording(&r));
        let stats = sfu.stats();
        assert_eq!(stats.transports, 1);
        assert_eq!(stats.consumers, 0);
        assert_eq!(stats.producers, 1);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_restart_replaces_previous_recorder() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("spawns.log");
        let stub = long_running_stub(dir.path(), &log);
        let (sfu, r) = sfu_with_video_producer(&dir.path().join("hls"), &stub);
        let recording = RecordingManager::new(Arc::clone(&sfu));

        recording.start_hls(&r).await.unwrap();
        let first_pid = wait_for_pids(&log, 1).await.remove(0);

        recording.start_hls(&r).await.unwrap();
        let pids = wait_for_pids(&log, 2).await;

        // The first child was killed and reaped before the second
        // start returned; the registry holds exactly one job
        assert_eq!(recording.job_count(), 1);
        assert!(!pid_alive(&first_pid));
        assert!(pid_alive(&pids[1]));

        recording.stop_all().await;
        assert_eq!(recording.job_count(), 0);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_concurrent_starts_leave_one_recorder() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("spawns.log");
        let stub = long_running_stub(dir.path(), &log);
        let (sfu, r) = sfu_with_video_producer(&dir.path().join("hls"), &stub);
        let recording = RecordingManager::new(Arc::clone(&sfu));

        let (a, b) = tokio::join!(recording.start_hls(&r), recording.start_hls(&r));
        a.unwrap();
        b.unwrap();

        assert_eq!(recording.job_count(), 1);

        // Both spawns echo quickly, but the replaced child may be
        // killed before its echo runs, so don't insist on both pids
        for _ in 0..20 {
            let logged = std::fs::read_to_string(&log).map_or(0, |c| c.split_whitespace().count());
            if logged >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let pids: Vec<String> = std::fs::read_to_string(&log)
            .unwrap()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let alive = pids.iter().filter(|pid| pid_alive(pid)).count();
        assert_eq!(alive, 1, "exactly one recorder should be running, got {alive}");

        recording.stop_all().await;
        assert_eq!(recording.job_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_monitor_reaps_recorder_exiting_on_its_own() {
        let dir = tempfile::tempdir().unwrap();
        let stub = write_stub(dir.path(), "#!/bin/sh\nexit 0\n");
        let (sfu, r) = sfu_with_video_producer(&dir.path().join("hls"), &stub);
        let recording = RecordingManager::new(Arc::clone(&sfu));

        recording.start_hls(&r).await.unwrap();

        for _ in 0..50 {
            if !recording.is_recording(&r) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        // Exit removes the job and releases its relay transport
        assert!(!recording.is_recording(&r));
        let stats = sfu.stats();
        assert_eq!(stats.transports, 1);
        assert_eq!(stats.consumers, 0);
    }

    #[tokio::test]
    async fn test_stop_without_recording_is_noop() {
        let sfu = SfuManager::new(SfuConfig::default());
        let recording = RecordingManager::new(sfu);

        assert!(!recording.stop_hls(&room_id("nothing")).await);
        assert_eq!(recording.job_count(), 0);
    }
}
