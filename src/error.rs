//! Error types for the storage layer.

use thiserror::Error;

/// Failures raised by the storage engine.
///
/// Everything here is an infrastructure failure. User-correctable problems
/// are reported through [`ValidationError`](crate::session::editor::ValidationError)
/// instead and never reach this type.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no entry with id {0}")]
    NotFound(i64),

    #[error("background task failed: {0}")]
    Background(#[from] tokio::task::JoinError),
}
