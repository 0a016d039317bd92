//! Error types for the bridge, the session controller and configuration.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures inside the step gate and frame snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebugError {
    #[error("a step gate is already pending (pause #{pending})")]
    GateBusy { pending: u64 },

    #[error("no pause is pending")]
    NoPendingPause,

    #[error("pause #{requested} is not the pending pause #{pending}")]
    StalePause { requested: u64, pending: u64 },

    #[error("frame snapshot has been released")]
    SnapshotReleased,

    #[error("frame snapshot refers to a frame that no longer exists")]
    StaleFrame,

    #[error("controller disconnected")]
    ControllerGone,
}

/// Failures of session controller requests.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a run is already active")]
    AlreadyActive,

    #[error("no run is active")]
    NotActive,

    #[error("the session is not paused")]
    NotPaused,

    #[error("failed to spawn interpreter thread: {0}")]
    Spawn(#[source] io::Error),

    #[error(transparent)]
    Debug(#[from] DebugError),

    #[error("console I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Failures loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, SessionError>;
