//! Account records and their status state machine

use std::fmt;
use std::time::SystemTime;

use common::Secret;

/// Runtime status of a pool account.
///
/// Transitions:
/// - Unknown → Active (usage under limit, or a successful upload)
/// - Unknown/Active → Exhausted (usage at limit, or quota rejection on upload)
/// - any → Errored (credential rejected)
/// - Exhausted → Active only when re-activation is enabled and a probe shows
///   usage back under the limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Unknown,
    Active,
    Exhausted,
    Errored,
}

impl AccountStatus {
    /// Status label for stats and logging.
    pub fn label(&self) -> &'static str {
        match self {
            AccountStatus::Unknown => "unknown",
            AccountStatus::Active => "active",
            AccountStatus::Exhausted => "exhausted",
            AccountStatus::Errored => "errored",
        }
    }

    /// Whether `select()` may hand this account out.
    pub fn is_selectable(&self) -> bool {
        matches!(self, AccountStatus::Unknown | AccountStatus::Active)
    }
}

/// What put an account into `Exhausted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExhaustionCause {
    /// Polled usage reached the limit
    Usage,
    /// The storage service refused an upload for quota
    UploadRejected,
}

/// One credential and its last known quota state. Only the pool holds these.
#[derive(Debug)]
pub(crate) struct Account {
    pub(crate) token: Secret<String>,
    pub(crate) account_id: Option<String>,
    pub(crate) limit_bytes: Option<u64>,
    pub(crate) used_bytes: Option<u64>,
    pub(crate) status: AccountStatus,
    pub(crate) exhausted_by: Option<ExhaustionCause>,
    pub(crate) last_probed_at: Option<SystemTime>,
}

impl Account {
    pub(crate) fn new(token: Secret<String>) -> Self {
        Self {
            token,
            account_id: None,
            limit_bytes: None,
            used_bytes: None,
            status: AccountStatus::Unknown,
            exhausted_by: None,
            last_probed_at: None,
        }
    }

    pub(crate) fn snapshot(&self, index: usize) -> AccountSnapshot {
        AccountSnapshot {
            index,
            account_id: self.account_id.clone(),
            status: self.status,
            used_bytes: self.used_bytes,
            limit_bytes: self.limit_bytes,
            last_probed_at: self.last_probed_at,
        }
    }
}

/// Owned, token-free copy of an account's state.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    /// Position in the pool's rotation order
    pub index: usize,
    pub account_id: Option<String>,
    pub status: AccountStatus,
    pub used_bytes: Option<u64>,
    pub limit_bytes: Option<u64>,
    pub last_probed_at: Option<SystemTime>,
}

impl AccountSnapshot {
    /// Used share of the limit in percent, when both figures are known.
    pub fn usage_pct(&self) -> Option<f64> {
        match (self.used_bytes, self.limit_bytes) {
            (Some(used), Some(limit)) if limit > 0 => Some(used as f64 / limit as f64 * 100.0),
            _ => None,
        }
    }
}

/// Account counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub unknown: usize,
    pub active: usize,
    pub exhausted: usize,
    pub errored: usize,
}

impl StatusCounts {
    pub fn tally<'a>(statuses: impl IntoIterator<Item = &'a AccountStatus>) -> Self {
        let mut counts = Self::default();
        for status in statuses {
            match status {
                AccountStatus::Unknown => counts.unknown += 1,
                AccountStatus::Active => counts.active += 1,
                AccountStatus::Exhausted => counts.exhausted += 1,
                AccountStatus::Errored => counts.errored += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.unknown + self.active + self.exhausted + self.errored
    }

    pub fn selectable(&self) -> usize {
        self.unknown + self.active
    }
}

impl fmt::Display for StatusCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} accounts selectable ({} active, {} unknown, {} exhausted, {} errored)",
            self.selectable(),
            self.total(),
            self.active,
            self.unknown,
            self.exhausted,
            self.errored
        )
    }
}
