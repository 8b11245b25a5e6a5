//! Storage client abstraction for the upload pool
//!
//! Defines the `StorageClient` trait that decouples pool orchestration from the
//! concrete storage service. The GoFile adapter in the relay service implements
//! it over HTTP; tests implement it with scripted in-memory responses.
//!
//! Every failure a client reports is one of three kinds, and the orchestrator's
//! failover policy is keyed on that kind alone:
//! - Quota: the account is out of traffic, mark it exhausted and fail over
//! - Auth: the credential was rejected, mark it errored and fail over
//! - Transient: network trouble, retry the same account a bounded number of times

pub mod source;

pub use source::FileSource;

use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// Classification of a failed storage call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Retryable on the same account (timeouts, 5xx, connection errors)
    Transient,
    /// Monthly traffic or storage quota exhausted, fail over to the next account
    QuotaExceeded,
    /// Credential rejected (401/403), never use the account again
    Auth,
}

impl ErrorClassification {
    /// Label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorClassification::Transient => "transient",
            ErrorClassification::QuotaExceeded => "quota",
            ErrorClassification::Auth => "auth",
        }
    }
}

/// Errors reported by a storage client.
///
/// Messages may contain upstream response bodies but never the token.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("quota exceeded: {0}")]
    Quota(String),

    #[error("credential rejected: {0}")]
    Auth(String),

    #[error("transient storage failure: {0}")]
    Transient(String),
}

impl StorageError {
    /// Build an error of the given classification.
    pub fn from_classification(classification: ErrorClassification, message: String) -> Self {
        match classification {
            ErrorClassification::Transient => StorageError::Transient(message),
            ErrorClassification::QuotaExceeded => StorageError::Quota(message),
            ErrorClassification::Auth => StorageError::Auth(message),
        }
    }

    pub fn classification(&self) -> ErrorClassification {
        match self {
            StorageError::Quota(_) => ErrorClassification::QuotaExceeded,
            StorageError::Auth(_) => ErrorClassification::Auth,
            StorageError::Transient(_) => ErrorClassification::Transient,
        }
    }
}

/// Result alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A completed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    /// Public share link returned by the storage service
    pub link: String,
    /// Storage-side content identifier, when the service reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
}

/// Operations the pool consumes from the storage service.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn StorageClient>`). The token is passed per call; clients hold no
/// per-account state.
pub trait StorageClient: Send + Sync {
    /// Identifier for logging (e.g. "gofile")
    fn id(&self) -> &str;

    /// Resolve the storage-side account identifier for a token.
    ///
    /// Returns `StorageError::Auth` when the token is rejected.
    fn resolve_identity<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

    /// Fetch the raw account-info document for usage parsing.
    ///
    /// The key set is not fixed; callers parse the value defensively.
    fn fetch_usage<'a>(
        &'a self,
        token: &'a str,
        account_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;

    /// Upload a file with the given token.
    ///
    /// The source may be read once per call; the orchestrator calls this
    /// repeatedly with the same source when failing over.
    fn upload_file<'a>(
        &'a self,
        token: &'a str,
        file: &'a FileSource,
    ) -> Pin<Box<dyn Future<Output = Result<UploadReceipt>> + Send + 'a>>;
}
