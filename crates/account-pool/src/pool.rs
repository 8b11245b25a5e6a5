//! Pool state and round-robin account selection
//!
//! The pool owns every `Account` behind one `tokio::sync::Mutex`. Selection,
//! status transitions, usage updates, and snapshots all take that lock, and
//! none of them hold it across a network call: callers receive owned copies
//! (`SelectedAccount`, `ProbeTarget`, `PoolSnapshot`) and report back by index.
//!
//! Membership is fixed at construction. The rotation order is the order of the
//! configured tokens; the cursor remembers the last account handed out so the
//! next selection starts after it.

use std::time::SystemTime;

use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::account::{Account, AccountSnapshot, AccountStatus, ExhaustionCause, StatusCounts};
use crate::error::{Error, Result};

/// Pool behaviour switches.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Fraction of the limit at which polled usage counts as exhausted (0, 1].
    pub exhaustion_threshold: f64,
    /// Let a probe move an `Exhausted` account back to `Active` once usage is
    /// under the limit again (monthly quota reset). Off by default.
    pub reactivate_exhausted: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            exhaustion_threshold: 1.0,
            reactivate_exhausted: false,
        }
    }
}

/// An account handed out for one upload attempt.
#[derive(Debug, Clone)]
pub struct SelectedAccount {
    /// Position in the pool, used to report the attempt's outcome
    pub index: usize,
    pub token: Secret<String>,
    pub account_id: Option<String>,
}

/// An account the prober should refresh.
#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub index: usize,
    pub token: Secret<String>,
    pub account_id: Option<String>,
}

/// Owned copy of the whole pool.
#[derive(Debug, Clone)]
pub struct PoolSnapshot {
    pub accounts: Vec<AccountSnapshot>,
    /// Index of the account most recently handed out by `select()`
    pub cursor: Option<usize>,
}

struct PoolState {
    accounts: Vec<Account>,
    cursor: Option<usize>,
}

/// Fixed set of GoFile accounts with round-robin selection.
pub struct Pool {
    state: Mutex<PoolState>,
    size: usize,
    options: PoolOptions,
}

impl Pool {
    /// Create a pool from the configured tokens, all `Unknown`.
    ///
    /// Returns `EmptyPool` if `tokens` is empty.
    pub fn new(tokens: Vec<Secret<String>>, options: PoolOptions) -> Result<Self> {
        if tokens.is_empty() {
            return Err(Error::EmptyPool);
        }
        let accounts: Vec<Account> = tokens.into_iter().map(Account::new).collect();
        let size = accounts.len();
        info!(accounts = size, "pool initialized");
        Ok(Self {
            state: Mutex::new(PoolState {
                accounts,
                cursor: None,
            }),
            size,
            options,
        })
    }

    /// Number of accounts. Constant for the pool's lifetime.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Always false; construction rejects empty pools.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Select the next selectable account after the cursor.
    ///
    /// Examines each account at most once. On success the cursor moves to the
    /// returned account. Returns `PoolExhausted` with status counts when every
    /// account is `Exhausted` or `Errored`.
    pub async fn select(&self) -> Result<SelectedAccount> {
        let mut state = self.state.lock().await;
        let n = state.accounts.len();
        let start = state.cursor.map_or(0, |c| (c + 1) % n);

        for offset in 0..n {
            let idx = (start + offset) % n;
            let account = &state.accounts[idx];
            if !account.status.is_selectable() {
                continue;
            }
            let selected = SelectedAccount {
                index: idx,
                token: account.token.clone(),
                account_id: account.account_id.clone(),
            };
            state.cursor = Some(idx);
            debug!(account = idx, "account selected");
            return Ok(selected);
        }

        let counts = tally(&state.accounts);
        warn!(%counts, "no selectable account left");
        Err(Error::PoolExhausted(counts))
    }

    /// Mark an account `Exhausted` after the storage service refused an upload
    /// for quota. Idempotent. An `Errored` account stays `Errored`.
    pub async fn mark_exhausted(&self, index: usize) {
        let mut state = self.state.lock().await;
        let Some(account) = state.accounts.get_mut(index) else {
            warn!(account = index, "mark_exhausted for unknown account index");
            return;
        };
        if account.status == AccountStatus::Errored {
            return;
        }
        account.exhausted_by = Some(ExhaustionCause::UploadRejected);
        transition(index, account, AccountStatus::Exhausted, "upload rejected for quota");
    }

    /// Mark an account `Errored` after its credential was rejected. Idempotent
    /// and permanent for the process lifetime.
    pub async fn mark_errored(&self, index: usize) {
        let mut state = self.state.lock().await;
        let Some(account) = state.accounts.get_mut(index) else {
            warn!(account = index, "mark_errored for unknown account index");
            return;
        };
        transition(index, account, AccountStatus::Errored, "credential rejected");
    }

    /// Promote an `Unknown` account to `Active` after a successful upload.
    ///
    /// Never resurrects an account another caller marked exhausted or errored
    /// in the meantime.
    pub async fn record_success(&self, index: usize) {
        let mut state = self.state.lock().await;
        if let Some(account) = state.accounts.get_mut(index)
            && account.status == AccountStatus::Unknown
        {
            transition(index, account, AccountStatus::Active, "upload succeeded");
        }
    }

    /// Record polled usage figures.
    ///
    /// Known figures overwrite the stored ones; `None` leaves a field alone.
    /// With both figures known and a non-zero limit, usage at or above
    /// `limit * exhaustion_threshold` marks the account `Exhausted`, and usage
    /// below it promotes `Unknown` to `Active`. Without a limit the status is
    /// left unchanged.
    pub async fn record_usage(
        &self,
        index: usize,
        used_bytes: Option<u64>,
        limit_bytes: Option<u64>,
    ) {
        let threshold = self.options.exhaustion_threshold;
        let reactivate = self.options.reactivate_exhausted;

        let mut state = self.state.lock().await;
        let Some(account) = state.accounts.get_mut(index) else {
            warn!(account = index, "record_usage for unknown account index");
            return;
        };

        let previous_used = account.used_bytes;
        if used_bytes.is_some() {
            account.used_bytes = used_bytes;
        }
        if limit_bytes.is_some() {
            account.limit_bytes = limit_bytes;
        }
        if used_bytes.is_some() || limit_bytes.is_some() {
            account.last_probed_at = Some(SystemTime::now());
        }

        let (Some(used), Some(limit)) = (account.used_bytes, account.limit_bytes) else {
            return;
        };
        if limit == 0 {
            return;
        }

        let at_limit = used as f64 >= limit as f64 * threshold;
        match account.status {
            AccountStatus::Errored => {}
            AccountStatus::Unknown | AccountStatus::Active if at_limit => {
                account.exhausted_by = Some(ExhaustionCause::Usage);
                transition(index, account, AccountStatus::Exhausted, "usage reached limit");
            }
            AccountStatus::Unknown if !at_limit => {
                transition(index, account, AccountStatus::Active, "usage under limit");
            }
            AccountStatus::Exhausted if reactivate && !at_limit => {
                // A stale probe must not undo a fresh upload rejection: only
                // reactivate when usage fell (quota reset) or usage caused it.
                let usage_dropped = previous_used.is_some_and(|prev| used < prev);
                if usage_dropped || account.exhausted_by == Some(ExhaustionCause::Usage) {
                    account.exhausted_by = None;
                    transition(index, account, AccountStatus::Active, "usage back under limit");
                }
            }
            _ => {}
        }
    }

    /// Cache the storage-side account id resolved by the prober.
    pub async fn set_account_id(&self, index: usize, account_id: String) {
        let mut state = self.state.lock().await;
        if let Some(account) = state.accounts.get_mut(index) {
            account.account_id = Some(account_id);
        }
    }

    /// Accounts worth probing: everything except `Errored`.
    pub async fn probe_targets(&self) -> Vec<ProbeTarget> {
        let state = self.state.lock().await;
        state
            .accounts
            .iter()
            .enumerate()
            .filter(|(_, a)| a.status != AccountStatus::Errored)
            .map(|(index, a)| ProbeTarget {
                index,
                token: a.token.clone(),
                account_id: a.account_id.clone(),
            })
            .collect()
    }

    /// Owned copy of every account's state plus the cursor. Tokens excluded.
    pub async fn snapshot(&self) -> PoolSnapshot {
        let state = self.state.lock().await;
        PoolSnapshot {
            accounts: state
                .accounts
                .iter()
                .enumerate()
                .map(|(i, a)| a.snapshot(i))
                .collect(),
            cursor: state.cursor,
        }
    }

    /// Account counts per status.
    pub async fn status_counts(&self) -> StatusCounts {
        let state = self.state.lock().await;
        tally(&state.accounts)
    }
}

fn tally(accounts: &[Account]) -> StatusCounts {
    StatusCounts::tally(accounts.iter().map(|a| &a.status))
}

/// Apply a status change, logging and counting only real changes.
fn transition(index: usize, account: &mut Account, to: AccountStatus, reason: &'static str) {
    let from = account.status;
    if from == to {
        return;
    }
    account.status = to;
    match to {
        AccountStatus::Exhausted | AccountStatus::Errored => {
            warn!(
                account = index,
                from = from.label(),
                to = to.label(),
                reason,
                "account status changed"
            );
        }
        AccountStatus::Active | AccountStatus::Unknown => {
            info!(
                account = index,
                from = from.label(),
                to = to.label(),
                reason,
                "account status changed"
            );
        }
    }
    metrics::counter!("pool_account_transitions_total", "status" => to.label()).increment(1);
}
