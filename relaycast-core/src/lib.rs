pub mod config;
pub mod error;
pub mod id;
pub mod logging;

pub use config::{load_config, Config, LoggingConfig, RecordingSettings, ServerConfig, SfuSettings};
pub use error::{Error, Result};
pub use id::{ClientId, ConsumerId, ProducerId, RoomId, TransportId};
