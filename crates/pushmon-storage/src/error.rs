/// Errors produced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An underlying SQLite error.
    #[error("storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Snapshot (de)serialization failure.
    #[error("storage: snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot file I/O failure.
    #[error("storage: snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
}
