use std::io;

use thiserror::Error;

/// Error type for remote calls, persisted state, and derived artifact builds.
///
/// The batch downloader only inspects three classes: `Transient` is requeued
/// behind a cooldown, `Cancelled` always unwinds, and everything else is
/// handled according to `stop_on_errors`.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote request failed: {0}")]
    Permanent(String),
    #[error("transient network failure: {0}")]
    Transient(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("missing prerequisite input: {0}")]
    MissingInput(String),
    #[error("corrupt persisted state: {0}")]
    CorruptState(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Table(#[from] csv::Error),
    #[error(transparent)]
    Archive(#[from] zip::result::ZipError),
}

impl SyncError {
    /// True for failures worth retrying after a cooldown (connection reset, throttling).
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }

    /// True when the user asked the run to stop.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}
