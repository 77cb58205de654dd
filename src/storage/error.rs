//! Persistence error taxonomy, shared by all three backends.

/// Errors a [`super::Backend`] implementation can report.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested snapshot does not exist.
    #[error("snapshot not found: {0}")]
    NotFound(String),

    /// The room id or snapshot id was structurally invalid (e.g. a
    /// filesystem traversal attempt).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Underlying I/O failure (disk, database connection, etc.).
    #[error("backend I/O error: {0}")]
    Io(String),

    /// A stored record could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}
