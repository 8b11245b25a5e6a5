//! Account pool and upload orchestration for GoFile credentials
//!
//! Spreads uploads across several GoFile accounts, each with its own monthly
//! traffic quota, and fails over when one runs dry. The pool owns all account
//! state behind a single mutex; everything else sees owned snapshots.
//!
//! Account lifecycle:
//! 1. Pool built from the configured tokens, every account `Unknown`
//! 2. Prober resolves the account id and reads usage → `Active` or `Exhausted`
//! 3. Uploader selects accounts round-robin, skipping `Exhausted`/`Errored`
//! 4. Upload rejected for quota → `Exhausted`, retry on the next account
//! 5. Upload rejected for credentials → `Errored` for the rest of the process
//! 6. Transient failures retry the same account a bounded number of times
//!
//! Exhaustion seen in an upload response is authoritative; polled usage lags.

pub mod account;
pub mod error;
pub mod pool;
pub mod probe;
pub mod quota;
pub mod stats;
pub mod upload;
pub mod usage;

#[cfg(test)]
mod testing;

pub use account::{AccountSnapshot, AccountStatus, StatusCounts};
pub use error::{Error, Result};
pub use pool::{Pool, PoolOptions, PoolSnapshot, ProbeTarget, SelectedAccount};
pub use probe::{ProbeOutcome, ProbeSummary, probe_all, spawn_probe_task};
pub use quota::{classify_body, classify_status};
pub use stats::Stats;
pub use upload::{RetryPolicy, Uploader};
pub use usage::{Usage, parse_usage};
