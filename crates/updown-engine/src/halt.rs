//! Per-account halt latches.
//!
//! When the ledger detects that frozen/available bookkeeping has drifted
//! for a user, that user is halted: every further balance mutation is
//! refused until an operator resets the latch. There is no automatic
//! recovery.
//!
//! # Example
//! ```
//! use updown_core::UserId;
//! use updown_engine::AccountHalts;
//!
//! let halts = AccountHalts::new();
//! let user = UserId::from("u1");
//! assert!(halts.reason(&user).is_none());
//!
//! assert!(halts.trigger(&user, "frozen < release amount"));
//! assert!(!halts.trigger(&user, "second report"));
//! assert_eq!(halts.reason(&user).as_deref(), Some("frozen < release amount"));
//! ```

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{error, warn};

use updown_core::UserId;
use updown_telemetry::Metrics;

#[derive(Debug, Clone)]
struct HaltRecord {
    reason: String,
    triggered_at: Instant,
}

/// Registry of halted accounts.
#[derive(Debug, Default)]
pub struct AccountHalts {
    halted: DashMap<UserId, HaltRecord>,
}

impl AccountHalts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Halt `user`.
    ///
    /// Returns `true` if this call latched the account. If it was already
    /// halted, the original reason and time are kept.
    pub fn trigger(&self, user: &UserId, reason: &str) -> bool {
        let latched = match self.halted.entry(user.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(HaltRecord {
                    reason: reason.to_string(),
                    triggered_at: Instant::now(),
                });
                true
            }
        };

        if latched {
            error!(user = %user, reason, "ACCOUNT HALTED: ledger invariant violated");
            Metrics::halted_accounts_set(self.halted.len() as i64);
        }
        latched
    }

    /// Halt reason, if `user` is halted.
    #[must_use]
    pub fn reason(&self, user: &UserId) -> Option<String> {
        self.halted.get(user).map(|r| r.reason.clone())
    }

    /// Time since `user` was halted.
    #[must_use]
    pub fn elapsed_since_trigger(&self, user: &UserId) -> Option<Duration> {
        self.halted.get(user).map(|r| r.triggered_at.elapsed())
    }

    /// All halted users.
    pub fn halted_users(&self) -> Vec<UserId> {
        self.halted.iter().map(|r| r.key().clone()).collect()
    }

    /// Clear the halt for `user`.
    ///
    /// Only for an operator who has reconciled the account by hand.
    pub fn reset(&self, user: &UserId) -> bool {
        let removed = self.halted.remove(user).is_some();
        if removed {
            warn!(user = %user, "Account halt RESET by operator");
            Metrics::halted_accounts_set(self.halted.len() as i64);
        }
        removed
    }
}
