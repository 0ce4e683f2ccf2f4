/// All errors that can be returned by a `PrimaryStore` or `ArchiveStore`
/// implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// No record (primary) or blob (archive) exists for the given id.
    ///
    /// For point deletes this is a normal, non-fatal result: the caller
    /// wanted the record gone and it is gone.
    #[error("record not found: {id}")]
    NotFound { id: String },

    /// An archive write with `overwrite = false` found different content
    /// already stored under the same id.
    #[error("archive object already exists with different content: {id}")]
    AlreadyExists { id: String },

    /// The id cannot address a record in this backend (empty, or unusable
    /// as a blob/file name).
    #[error("invalid record id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    /// The backend could not be reached, or a call timed out.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// A backend-specific storage error (I/O, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn not_found(id: impl Into<String>) -> Self {
        StorageError::NotFound { id: id.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}
