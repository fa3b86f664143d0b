use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure taxonomy for a single transfer operation.
///
/// Nothing here is retried; each failure is terminal for the operation that
/// hit it, and recovery only happens on the next independent trigger.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("peer not found: {0}")]
    PeerNotFound(String),
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),
    #[error("transfer timed out after {0:?}")]
    TimedOut(Duration),
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),
    #[error("i/o error: {0}")]
    Io(#[source] std::io::Error),
    #[error("peer rejected transfer: {0}")]
    Rejected(String),
}
