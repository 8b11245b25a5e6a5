//! Read-only pool statistics
//!
//! Built from a `PoolSnapshot`, so rendering stats never touches the pool
//! lock or moves the round-robin cursor.

use std::fmt::Write as _;
use std::time::UNIX_EPOCH;

use serde_json::{Value, json};

use crate::account::{AccountSnapshot, StatusCounts};
use crate::pool::PoolSnapshot;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Summary of the pool at one point in time.
#[derive(Debug, Clone)]
pub struct Stats {
    /// Account the next upload would start with, if any is selectable
    pub current: Option<AccountSnapshot>,
    pub counts: StatusCounts,
    pub accounts: Vec<AccountSnapshot>,
}

impl Stats {
    pub fn from_snapshot(snapshot: PoolSnapshot) -> Self {
        let n = snapshot.accounts.len();
        let start = snapshot.cursor.map_or(0, |c| (c + 1) % n.max(1));
        let current = (0..n)
            .map(|offset| &snapshot.accounts[(start + offset) % n])
            .find(|a| a.status.is_selectable())
            .cloned();
        let counts = StatusCounts::tally(snapshot.accounts.iter().map(|a| &a.status));

        Self {
            current,
            counts,
            accounts: snapshot.accounts,
        }
    }

    /// `healthy` when every account is selectable, `degraded` when some are,
    /// `unhealthy` when none are.
    pub fn health(&self) -> &'static str {
        let selectable = self.counts.selectable();
        if selectable > 0 && selectable == self.counts.total() {
            "healthy"
        } else if selectable > 0 {
            "degraded"
        } else {
            "unhealthy"
        }
    }

    /// Plain-text summary for operators.
    pub fn render(&self) -> String {
        let mut out = String::new();
        match &self.current {
            Some(current) => {
                let _ = writeln!(out, "Current account: #{}", current.index);
                if let Some(id) = &current.account_id {
                    let _ = writeln!(out, "Account ID: {id}");
                }
                match (current.used_bytes, current.limit_bytes) {
                    (Some(used), Some(limit)) if limit > 0 => {
                        let _ = writeln!(
                            out,
                            "Monthly traffic: {:.2} / {:.2} GB",
                            used as f64 / GIB,
                            limit as f64 / GIB
                        );
                    }
                    _ => {
                        let _ = writeln!(out, "Usage info unavailable");
                    }
                }
            }
            None => {
                let _ = writeln!(out, "No usable account");
            }
        }
        let _ = write!(
            out,
            "Accounts: {} active, {} unknown, {} exhausted, {} errored ({})",
            self.counts.active,
            self.counts.unknown,
            self.counts.exhausted,
            self.counts.errored,
            self.health()
        );
        out
    }

    pub fn to_json(&self) -> Value {
        json!({
            "status": self.health(),
            "current": self.current.as_ref().map(account_json),
            "accounts_total": self.counts.total(),
            "accounts_active": self.counts.active,
            "accounts_unknown": self.counts.unknown,
            "accounts_exhausted": self.counts.exhausted,
            "accounts_errored": self.counts.errored,
            "accounts": self.accounts.iter().map(account_json).collect::<Vec<_>>(),
        })
    }
}

fn account_json(account: &AccountSnapshot) -> Value {
    json!({
        "index": account.index,
        "account_id": account.account_id,
        "status": account.status.label(),
        "used_bytes": account.used_bytes,
        "limit_bytes": account.limit_bytes,
        "usage_pct": account.usage_pct(),
        "last_probed_at": account
            .last_probed_at
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs()),
    })
}
