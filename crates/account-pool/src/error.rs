//! Error types for pool operations

use crate::account::StatusCounts;

/// Terminal outcomes surfaced to callers of the pool.
///
/// Per-account quota and credential failures never appear here; the uploader
/// turns them into account transitions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("no accounts configured")]
    EmptyPool,

    /// Every account is exhausted or errored. Retrying soon will not help.
    #[error("pool exhausted: {0}")]
    PoolExhausted(StatusCounts),

    /// Every account was tried and failed transiently. Safe to resubmit.
    #[error("upload failed after trying {accounts_tried} accounts: {last_error}")]
    UploadFailed {
        accounts_tried: usize,
        last_error: String,
    },
}

impl Error {
    /// Machine-readable error type for API responses and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::EmptyPool => "empty_pool",
            Error::PoolExhausted(_) => "pool_exhausted",
            Error::UploadFailed { .. } => "upload_failed",
        }
    }

    /// Whether the caller may resubmit the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::UploadFailed { .. })
    }
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
