use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Incompatible capabilities: {0}")]
    IncompatibleCapabilities(String),

    #[error("Upstream not ready: {0}")]
    UpstreamNotReady(String),

    #[error("Negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("Worker died: {0}")]
    WorkerDied(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error ends only the affected session, not the service.
    ///
    /// `WorkerDied` is the one variant that is fatal process-wide; everything
    /// else is reported to the caller and the service keeps running.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::WorkerDied(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
