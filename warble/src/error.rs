use kvstore::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WarbleError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("corrupt record under {key}: {reason}")]
    Corrupt { key: String, reason: String },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl WarbleError {
    /// Whether this is a business-level rejection rather than a fault.
    ///
    /// Absences are reported to callers as a distinct outcome; everything
    /// else is an error.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::AlreadyExists(_))
    }
}
