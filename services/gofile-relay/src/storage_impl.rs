//! GoFile storage client for the account pool
//!
//! Implements `StorageClient` over the `gofile` crate and turns its errors into
//! the quota / auth / transient kinds the orchestrator acts on.

use std::future::Future;
use std::pin::Pin;

use account_pool::classify_status;
use gofile::Endpoints;
use storage::{ErrorClassification, FileSource, StorageClient, StorageError, UploadReceipt};
use tracing::debug;

pub struct GofileStorage {
    client: reqwest::Client,
    /// Account lookups are short; uploads rely on the orchestrator's timeout.
    api_timeout: std::time::Duration,
    endpoints: Endpoints,
    folder_id: Option<String>,
}

impl GofileStorage {
    pub fn new(
        client: reqwest::Client,
        api_timeout: std::time::Duration,
        endpoints: Endpoints,
        folder_id: Option<String>,
    ) -> Self {
        Self {
            client,
            api_timeout,
            endpoints,
            folder_id,
        }
    }

    async fn with_api_timeout<T>(
        &self,
        call: impl Future<Output = gofile::Result<T>>,
    ) -> storage::Result<T> {
        match tokio::time::timeout(self.api_timeout, call).await {
            Ok(result) => result.map_err(map_error),
            Err(_) => Err(StorageError::Transient(format!(
                "GoFile API call timed out after {}s",
                self.api_timeout.as_secs()
            ))),
        }
    }
}

/// Classify a GoFile client error.
pub fn map_error(err: gofile::Error) -> StorageError {
    let classification = match &err {
        gofile::Error::InvalidCredentials(_) => ErrorClassification::Auth,
        gofile::Error::Status { status, body } => classify_status(*status, body),
        // 200 with an error envelope: only the body can tell us what happened
        gofile::Error::Api { body, .. } => classify_status(200, body),
        gofile::Error::Http(_)
        | gofile::Error::Timeout(_)
        | gofile::Error::MalformedResponse(_)
        | gofile::Error::Io(_) => ErrorClassification::Transient,
    };
    debug!(kind = classification.label(), error = %err, "GoFile call failed");
    StorageError::from_classification(classification, err.to_string())
}

impl StorageClient for GofileStorage {
    fn id(&self) -> &str {
        "gofile"
    }

    fn resolve_identity<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = storage::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.with_api_timeout(gofile::get_account_id(&self.client, &self.endpoints, token))
                .await
        })
    }

    fn fetch_usage<'a>(
        &'a self,
        token: &'a str,
        account_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = storage::Result<serde_json::Value>> + Send + 'a>> {
        Box::pin(async move {
            self.with_api_timeout(gofile::get_account_info(
                &self.client,
                &self.endpoints,
                token,
                account_id,
            ))
            .await
        })
    }

    fn upload_file<'a>(
        &'a self,
        token: &'a str,
        file: &'a FileSource,
    ) -> Pin<Box<dyn Future<Output = storage::Result<UploadReceipt>> + Send + 'a>> {
        Box::pin(async move {
            gofile::upload_file(
                &self.client,
                &self.endpoints,
                token,
                file,
                self.folder_id.as_deref(),
            )
            .await
            .map_err(map_error)
        })
    }
}
