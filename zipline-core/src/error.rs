use thiserror::Error;

#[derive(Error, Debug)]
pub enum ZipError {
    /// A paginated listing request failed.
    #[error("listing failed for folder '{folder}': {reason}")]
    Listing { folder: String, reason: String },

    /// Content download failed (streamed or buffered).
    #[error("fetch failed for '{path}': {reason}")]
    Fetch { path: String, reason: String },

    /// The output destination rejected a write or closed unexpectedly.
    #[error("sink error: {0}")]
    Sink(#[source] std::io::Error),

    /// Two entries were enqueued under the same archive path.
    #[error("duplicate archive path: {0}")]
    DuplicatePath(String),

    #[error("archive construction cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format error: {0}")]
    Format(String),
}

impl ZipError {
    /// True for an explicit cancellation, which callers usually should not
    /// surface to end users as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ZipError::Cancelled)
    }

    pub(crate) fn listing(folder: impl Into<String>, reason: impl ToString) -> Self {
        ZipError::Listing {
            folder: folder.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn fetch(path: impl Into<String>, reason: impl ToString) -> Self {
        ZipError::Fetch {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, ZipError>;
