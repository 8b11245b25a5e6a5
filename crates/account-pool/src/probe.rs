//! Usage probing
//!
//! Polls each account's usage from the storage service and feeds it into the
//! pool. Probing is best-effort: failures are logged and the account is left
//! as it was, except for a credential rejected during identity resolution,
//! which disables the account. Network calls happen outside the pool lock.

use std::sync::Arc;
use std::time::Duration;

use storage::{ErrorClassification, StorageClient};
use tracing::{debug, info, warn};

use crate::pool::{Pool, ProbeTarget};
use crate::usage::{Usage, parse_usage};

/// Result of probing one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Usage parsed and recorded
    Updated(Usage),
    /// Account document fetched but no usable figures in it
    Unparsed,
    /// Credential rejected during identity resolution; account disabled
    Rejected,
    /// Lookup failed; account left unchanged
    Failed(String),
}

impl ProbeOutcome {
    fn label(&self) -> &'static str {
        match self {
            ProbeOutcome::Updated(_) => "updated",
            ProbeOutcome::Unparsed => "unparsed",
            ProbeOutcome::Rejected => "rejected",
            ProbeOutcome::Failed(_) => "failed",
        }
    }
}

/// Per-outcome counts for one probe cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeSummary {
    pub updated: usize,
    pub unparsed: usize,
    pub rejected: usize,
    pub failed: usize,
}

impl ProbeSummary {
    fn add(&mut self, outcome: &ProbeOutcome) {
        match outcome {
            ProbeOutcome::Updated(_) => self.updated += 1,
            ProbeOutcome::Unparsed => self.unparsed += 1,
            ProbeOutcome::Rejected => self.rejected += 1,
            ProbeOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Probe one account and apply the result to the pool.
pub async fn probe_account(
    pool: &Pool,
    storage: &dyn StorageClient,
    target: &ProbeTarget,
) -> ProbeOutcome {
    let outcome = run_probe(pool, storage, target).await;
    metrics::counter!("pool_probes_total", "result" => outcome.label()).increment(1);
    outcome
}

async fn run_probe(
    pool: &Pool,
    storage: &dyn StorageClient,
    target: &ProbeTarget,
) -> ProbeOutcome {
    let token = target.token.expose();

    let account_id = match &target.account_id {
        Some(id) => id.clone(),
        None => match storage.resolve_identity(token).await {
            Ok(id) => {
                pool.set_account_id(target.index, id.clone()).await;
                id
            }
            Err(e) if e.classification() == ErrorClassification::Auth => {
                warn!(
                    account = target.index,
                    error = %e,
                    "credential rejected while resolving account id"
                );
                pool.mark_errored(target.index).await;
                return ProbeOutcome::Rejected;
            }
            Err(e) => {
                warn!(account = target.index, error = %e, "account id lookup failed");
                return ProbeOutcome::Failed(e.to_string());
            }
        },
    };

    let info = match storage.fetch_usage(token, &account_id).await {
        Ok(info) => info,
        Err(e) => {
            warn!(account = target.index, error = %e, "usage lookup failed");
            return ProbeOutcome::Failed(e.to_string());
        }
    };

    match parse_usage(&info) {
        Some(usage) => {
            pool.record_usage(target.index, Some(usage.used_bytes), Some(usage.limit_bytes))
                .await;
            debug!(
                account = target.index,
                used_bytes = usage.used_bytes,
                limit_bytes = usage.limit_bytes,
                "usage recorded"
            );
            ProbeOutcome::Updated(usage)
        }
        None => {
            debug!(account = target.index, "no usage figures in account document");
            ProbeOutcome::Unparsed
        }
    }
}

/// Probe every account that is not `Errored`, one after another.
pub async fn probe_all(pool: &Pool, storage: &dyn StorageClient) -> ProbeSummary {
    let mut summary = ProbeSummary::default();
    for target in pool.probe_targets().await {
        let outcome = probe_account(pool, storage, &target).await;
        summary.add(&outcome);
    }
    debug!(?summary, "probe cycle finished");
    summary
}

/// Spawn a background task that probes the pool every `interval`.
///
/// The first cycle runs immediately so statuses settle soon after startup.
pub fn spawn_probe_task(
    pool: Arc<Pool>,
    storage: Arc<dyn StorageClient>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "starting usage prober");
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            probe_all(&pool, storage.as_ref()).await;
        }
    })
}
