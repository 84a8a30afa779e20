//! Settlement and void reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use updown_core::{Amount, BetId, Direction, SessionKey, UserId};

/// A bet whose ledger side could not be completed during a fan-out.
///
/// The bet keeps whatever outcome it reached; an operator reconciles it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetFailure {
    pub bet_id: BetId,
    pub user_id: UserId,
    pub error: String,
}

/// Result of applying a session result to its bets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub session: SessionKey,
    pub result: Direction,
    pub settled_at: DateTime<Utc>,
    pub bets_won: usize,
    pub bets_lost: usize,
    /// Bets already terminal when reached (processed by another pass).
    pub bets_skipped: usize,
    /// Stake of the bets processed by this pass.
    pub total_staked: Amount,
    /// Gross payouts credited by this pass (stake included).
    pub total_payout: Amount,
    pub failures: Vec<BetFailure>,
    /// Store error that stopped the pass; remaining bets are still PENDING.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<String>,
}

impl SettlementReport {
    pub(crate) fn new(session: SessionKey, result: Direction, settled_at: DateTime<Utc>) -> Self {
        Self {
            session,
            result,
            settled_at,
            bets_won: 0,
            bets_lost: 0,
            bets_skipped: 0,
            total_staked: 0,
            total_payout: 0,
            failures: Vec::new(),
            interrupted: None,
        }
    }

    /// Bets that reached a terminal outcome in this pass.
    #[must_use]
    pub fn bets_processed(&self) -> usize {
        self.bets_won + self.bets_lost
    }
}

/// Result of cancelling a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidReport {
    pub session: SessionKey,
    pub reason: String,
    pub voided_at: DateTime<Utc>,
    pub bets_voided: usize,
    pub bets_skipped: usize,
    pub total_refunded: Amount,
    pub failures: Vec<BetFailure>,
    /// Store error that stopped the pass; remaining bets are still PENDING.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<String>,
}

impl VoidReport {
    pub(crate) fn new(session: SessionKey, reason: String, voided_at: DateTime<Utc>) -> Self {
        Self {
            session,
            reason,
            voided_at,
            bets_voided: 0,
            bets_skipped: 0,
            total_refunded: 0,
            failures: Vec::new(),
            interrupted: None,
        }
    }
}

/// Result of `resume_settlement`, shaped by the session's terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResumeReport {
    Settled(SettlementReport),
    Voided(VoidReport),
}
