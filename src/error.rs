/// Error types for the sync engine
///
/// Only whole-operation failures surface through `SyncError`. Per-file and per-row
/// failures inside a batch are logged and tallied by the caller instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Required request parameters were missing or empty
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A catalog statement or the catalog open itself failed
    #[error("Catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    /// Listing or probing the output directory failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A background worker panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Config file could not be read or parsed
    #[error("Config error: {0}")]
    Config(String),
}

pub type SyncResult<T> = Result<T, SyncError>;
