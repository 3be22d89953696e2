use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub sfu: SfuSettings,
    pub recording: RecordingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 5000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// SFU settings (router/transport/producer/consumer registries)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SfuSettings {
    /// Enable the SFU control plane (disable for mesh-only deployments)
    pub enabled: bool,
    /// Maximum concurrent rooms (0 = unlimited)
    pub max_rooms: usize,
    /// Local IP the media transports bind to
    pub listen_ip: String,
    /// Publicly announced IP (falls back to `listen_ip` when unset)
    pub announced_ip: Option<String>,
    /// RTC port range (min)
    pub rtc_min_port: u16,
    /// RTC port range (max)
    pub rtc_max_port: u16,
    /// Grace period before process exit after the worker dies (milliseconds)
    pub worker_exit_grace_ms: u64,
}

impl Default for SfuSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_rooms: 0,
            listen_ip: "127.0.0.1".to_string(),
            announced_ip: None,
            rtc_min_port: 40000,
            rtc_max_port: 49999,
            worker_exit_grace_ms: 2000,
        }
    }
}

/// Recording bridge settings (ffmpeg HLS output)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Enable the recording bridge
    pub enabled: bool,
    /// Fixed local RTP port the video producer is relayed to
    pub video_rtp_port: u16,
    /// Fixed local RTP port the audio producer is relayed to
    pub audio_rtp_port: u16,
    /// Root directory for per-room HLS output
    pub hls_root: String,
    /// ffmpeg binary to spawn
    pub ffmpeg_path: String,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            video_rtp_port: 12000,
            audio_rtp_port: 13000,
            hls_root: "./hls".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        // Load config file if provided
        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // Override with environment variables (RELAYCAST_SERVER_HOST, etc.)
        builder = builder.add_source(
            Environment::with_prefix("RELAYCAST")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }

    /// Validate configuration, collecting every problem instead of stopping
    /// at the first one.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.http_port == 0 {
            errors.push("server.http_port must be non-zero".to_string());
        }

        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            other => errors.push(format!(
                "logging.format must be \"json\" or \"pretty\", got \"{other}\""
            )),
        }

        if self.sfu.enabled {
            if self.sfu.rtc_min_port > self.sfu.rtc_max_port {
                errors.push(format!(
                    "sfu.rtc_min_port ({}) must not exceed sfu.rtc_max_port ({})",
                    self.sfu.rtc_min_port, self.sfu.rtc_max_port
                ));
            }
            if self.sfu.listen_ip.is_empty() {
                errors.push("sfu.listen_ip must not be empty".to_string());
            }
        }

        if self.recording.enabled {
            if self.recording.video_rtp_port == self.recording.audio_rtp_port {
                errors.push(format!(
                    "recording.video_rtp_port and recording.audio_rtp_port must differ (both {})",
                    self.recording.video_rtp_port
                ));
            }
            if self.recording.hls_root.is_empty() {
                errors.push("recording.hls_root must not be empty".to_string());
            }
            if self.recording.ffmpeg_path.is_empty() {
                errors.push("recording.ffmpeg_path must not be empty".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Load configuration from config file or environment variables
///
/// Config file search order:
/// 1. Explicit path argument (from the CLI)
/// 2. RELAYCAST_CONFIG_PATH environment variable
/// 3. ./config.toml (current working directory)
/// 4. /etc/relaycast/config.toml (system install path)
/// 5. Fall back to environment variables only
pub fn load_config(explicit_path: Option<&str>) -> anyhow::Result<Config> {
    let config_path = explicit_path
        .map(str::to_string)
        .filter(|p| Path::new(p).exists())
        .or_else(|| {
            std::env::var("RELAYCAST_CONFIG_PATH")
                .ok()
                .filter(|p| Path::new(p).exists())
        })
        .or_else(|| {
            let cwd = "config.toml";
            if Path::new(cwd).exists() {
                Some(cwd.to_string())
            } else {
                None
            }
        })
        .or_else(|| {
            let system = "/etc/relaycast/config.toml";
            if Path::new(system).exists() {
                Some(system.to_string())
            } else {
                None
            }
        });

    let config = if let Some(path) = config_path {
        eprintln!("Loading config from {path}");
        match Config::from_file(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load {path}: {e}");
                eprintln!("Falling back to environment variables");
                Config::from_env().unwrap_or_default()
            }
        }
    } else {
        eprintln!("No config file found, using environment variables");
        Config::from_env().unwrap_or_else(|e| {
            eprintln!("Failed to load config: {e}");
            eprintln!("Using default configuration");
            Config::default()
        })
    };

    if let Err(errors) = config.validate() {
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    Ok(config)
}
