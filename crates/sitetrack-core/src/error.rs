use thiserror::Error;

pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Failures surfaced by pulls, pushes and local mutations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Credential missing or still the placeholder. Reported, never retried.
    #[error("remote store not configured: {0}")]
    NotConfigured(String),
    #[error("remote store returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("remote request failed: {0}")]
    Transport(String),
    /// Fewer than two rows came back, i.e. nothing beyond the header.
    #[error("no data in sheet")]
    NoData,
    /// Another push is already in flight.
    #[error("a push is already in progress")]
    Busy,
    #[error("task not found: {0}")]
    UnknownTask(String),
    #[error("{0}")]
    Invalid(String),
    #[error("failed to write local cache: {0}")]
    Cache(String),
}

impl SyncError {
    pub fn is_busy(&self) -> bool {
        matches!(self, SyncError::Busy)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transport(err.to_string())
    }
}
