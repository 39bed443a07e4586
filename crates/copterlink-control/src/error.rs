use std::path::PathBuf;

/// Errors that can occur in link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error (resolve, bind, hard socket fault).
    #[error("transport error: {0}")]
    Transport(#[from] copterlink_transport::TransportError),

    /// The link configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A motor command did not carry one value per rotor.
    #[error("expected {expected} motor values, got {actual}")]
    MotorCountMismatch { expected: usize, actual: usize },

    /// The operation needs a stopped link and the loop is running.
    #[error("link is already running")]
    AlreadyRunning,

    /// The operation needs a stopped link and the loop is still winding down.
    #[error("link is {0}, not stopped")]
    NotStopped(crate::state::LinkState),

    /// The control loop thread could not be started.
    #[error("failed to spawn control loop thread: {0}")]
    Spawn(std::io::Error),

    /// A configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The control loop thread panicked.
    #[error("control loop panicked")]
    LoopPanicked,
}

pub type Result<T> = std::result::Result<T, LinkError>;
