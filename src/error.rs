//! Error types for the Aiko core

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Aiko core
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio backend error (stream build, playback, host)
    #[error("audio error: {0}")]
    Audio(String),

    /// Requested input device index does not exist
    #[error("input device #{index} not found ({available} available)")]
    DeviceNotFound { index: usize, available: usize },

    /// Speech model could not be loaded
    #[error("speech model load failed: {0}")]
    ModelLoad(String),

    /// Speech engine failed while decoding a frame
    #[error("speech engine error: {0}")]
    Speech(String),

    /// `SQLite` error
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A shared resource lock was poisoned by a panicking holder
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A supervised worker died more often than its restart budget allows
    #[error("worker '{worker}' exhausted its restart budget after {restarts} restarts")]
    RestartBudgetExhausted { worker: String, restarts: u32 },

    /// Session lock file could not be managed
    #[error("session lock error: {0}")]
    SessionLock(String),
}
