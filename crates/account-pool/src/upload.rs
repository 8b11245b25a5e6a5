//! Failover upload orchestration
//!
//! One upload runs a bounded loop over the pool: select an account, try it,
//! and act on the failure kind. Quota and credential failures move the account
//! out of rotation and fail over immediately; transient failures retry the same
//! account a few times first. The loop runs at most once per account.
//!
//! Dropping the future returned by `Uploader::upload` cancels the in-flight
//! attempt. Only transitions from attempts that already finished are kept.

use std::sync::Arc;
use std::time::Duration;

use storage::{ErrorClassification, FileSource, StorageClient, StorageError, UploadReceipt};
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::pool::{Pool, SelectedAccount};

/// Retry and timeout settings for upload attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra tries on the same account after a transient failure
    pub transient_retries: u32,
    /// Fixed pause before each same-account retry
    pub retry_delay: Duration,
    /// Upper bound on a single upload call
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            transient_retries: 2,
            retry_delay: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(3600),
        }
    }
}

/// Uploads files through the pool with failover.
pub struct Uploader {
    pool: Arc<Pool>,
    storage: Arc<dyn StorageClient>,
    policy: RetryPolicy,
}

impl Uploader {
    pub fn new(pool: Arc<Pool>, storage: Arc<dyn StorageClient>, policy: RetryPolicy) -> Self {
        Self {
            pool,
            storage,
            policy,
        }
    }

    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    pub fn storage(&self) -> &Arc<dyn StorageClient> {
        &self.storage
    }

    /// Upload `file`, failing over across accounts.
    ///
    /// Returns `PoolExhausted` when no account is selectable (before or after
    /// trying), and `UploadFailed` when every tried account failed transiently.
    #[instrument(skip_all, fields(filename = file.filename(), storage = self.storage.id()))]
    pub async fn upload(&self, file: &FileSource) -> Result<UploadReceipt> {
        let mut accounts_tried = 0usize;
        let mut last_transient: Option<StorageError> = None;

        for _ in 0..self.pool.len() {
            let account = match self.pool.select().await {
                Ok(account) => account,
                Err(e) => {
                    record_outcome("pool_exhausted");
                    return Err(e);
                }
            };
            accounts_tried += 1;

            match self.attempt(&account, file).await {
                Ok(receipt) => {
                    self.pool.record_success(account.index).await;
                    record_outcome("success");
                    info!(account = account.index, link = %receipt.link, "upload succeeded");
                    return Ok(receipt);
                }
                Err(e) => match e.classification() {
                    ErrorClassification::QuotaExceeded => {
                        warn!(
                            account = account.index,
                            error = %e,
                            "account out of quota, failing over"
                        );
                        self.pool.mark_exhausted(account.index).await;
                    }
                    ErrorClassification::Auth => {
                        warn!(
                            account = account.index,
                            error = %e,
                            "credential rejected, failing over"
                        );
                        self.pool.mark_errored(account.index).await;
                    }
                    ErrorClassification::Transient => {
                        warn!(
                            account = account.index,
                            error = %e,
                            "account kept failing, moving on"
                        );
                        // Quota and credential messages stay in the logs only
                        last_transient = Some(e);
                    }
                },
            }
        }

        let counts = self.pool.status_counts().await;
        if counts.selectable() == 0 {
            record_outcome("pool_exhausted");
            warn!(%counts, "upload abandoned, pool exhausted");
            return Err(Error::PoolExhausted(counts));
        }

        record_outcome("upload_failed");
        let last_error = last_transient.map_or_else(
            || "storage service unavailable".to_string(),
            |e| e.to_string(),
        );
        warn!(accounts_tried, error = %last_error, "upload failed on every account tried");
        Err(Error::UploadFailed {
            accounts_tried,
            last_error,
        })
    }

    /// Try one account, retrying transient failures in place.
    async fn attempt(
        &self,
        account: &SelectedAccount,
        file: &FileSource,
    ) -> storage::Result<UploadReceipt> {
        let max_tries = self.policy.transient_retries + 1;

        for try_no in 0..max_tries {
            if try_no > 0 {
                warn!(account = account.index, try_no, "retrying after transient failure");
                tokio::time::sleep(self.policy.retry_delay).await;
            }

            let call = self.storage.upload_file(account.token.expose(), file);
            let result = match tokio::time::timeout(self.policy.attempt_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(StorageError::Transient(format!(
                    "upload attempt timed out after {}s",
                    self.policy.attempt_timeout.as_secs()
                ))),
            };

            let label = match &result {
                Ok(_) => "success",
                Err(e) => e.classification().label(),
            };
            metrics::counter!("pool_upload_attempts_total", "result" => label).increment(1);

            match result {
                Err(e)
                    if e.classification() == ErrorClassification::Transient
                        && try_no + 1 < max_tries =>
                {
                    warn!(account = account.index, error = %e, "transient upload failure");
                }
                other => return other,
            }
        }

        Err(StorageError::Transient("no upload attempt made".into()))
    }
}

fn record_outcome(outcome: &'static str) {
    metrics::counter!("pool_uploads_total", "outcome" => outcome).increment(1);
}
