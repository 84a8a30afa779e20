//! Bet records and identifiers.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::balance::Amount;
use crate::session::{Direction, SessionKey};

/// Unique bet identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BetId(String);

impl BetId {
    /// Create a new unique bet ID.
    ///
    /// Format: `bet_{timestamp_ms}_{uuid}`
    pub fn new() -> Self {
        let ts = Utc::now().timestamp_millis();
        Self(format!("bet_{ts}_{}", Uuid::new_v4().simple()))
    }

    /// Create from an existing string (for persisted ids).
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User identifier, resolved by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Bet outcome. Moves only `Pending -> {Won, Lost, Void}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BetOutcome {
    Pending,
    Won,
    Lost,
    Void,
}

impl BetOutcome {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Won => "won",
            Self::Lost => "lost",
            Self::Void => "void",
        }
    }
}

impl fmt::Display for BetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().to_ascii_uppercase())
    }
}

/// A user's directional stake against one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub bet_id: BetId,
    pub session: SessionKey,
    pub user_id: UserId,
    pub direction: Direction,
    /// Stake in minor currency units.
    pub amount: Amount,
    pub placed_at: DateTime<Utc>,
    pub outcome: BetOutcome,
    /// Amount credited on a win (stake included), 0 otherwise.
    pub payout: Amount,
    /// Multiplier in force when the bet was placed.
    pub payout_multiplier: Decimal,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Bet {
    /// Create a pending bet.
    pub fn new(
        session: SessionKey,
        user_id: UserId,
        direction: Direction,
        amount: Amount,
        payout_multiplier: Decimal,
        placed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            bet_id: BetId::new(),
            session,
            user_id,
            direction,
            amount,
            placed_at,
            outcome: BetOutcome::Pending,
            payout: 0,
            payout_multiplier,
            settled_at: None,
        }
    }

    /// Gross payout if this bet wins: `floor(amount * multiplier)`.
    ///
    /// Returns `None` on overflow.
    #[must_use]
    pub fn winning_payout(&self) -> Option<Amount> {
        Decimal::from(self.amount)
            .checked_mul(self.payout_multiplier)?
            .floor()
            .to_u64()
    }

    /// Outcome this bet receives for a given session result.
    #[must_use]
    pub fn outcome_for(&self, result: Direction) -> BetOutcome {
        if self.direction == result {
            BetOutcome::Won
        } else {
            BetOutcome::Lost
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.outcome == BetOutcome::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn sample_bet(amount: Amount, multiplier: Decimal) -> Bet {
        let now = Utc.with_ymd_and_hms(2025, 7, 8, 10, 15, 10).unwrap();
        Bet::new(
            SessionKey::for_instant("XAU/USD", now),
            UserId::from("u1"),
            Direction::Up,
            amount,
            multiplier,
            now,
        )
    }

    #[test]
    fn test_winning_payout() {
        assert_eq!(sample_bet(20_000, dec!(1.8)).winning_payout(), Some(36_000));
        // Fractional minor units are floored
        assert_eq!(sample_bet(333, dec!(1.85)).winning_payout(), Some(616));
    }

    #[test]
    fn test_winning_payout_overflow() {
        // Exceeds u64
        assert_eq!(sample_bet(u64::MAX, dec!(2)).winning_payout(), None);
        // Exceeds Decimal itself
        let huge = Decimal::from(10_000_000_000_000u64);
        assert_eq!(sample_bet(10_000_000_000_000_000, huge).winning_payout(), None);
    }

    #[test]
    fn test_outcome_for_result() {
        let bet = sample_bet(100, dec!(1.8));
        assert_eq!(bet.outcome_for(Direction::Up), BetOutcome::Won);
        assert_eq!(bet.outcome_for(Direction::Down), BetOutcome::Lost);
    }

    #[test]
    fn test_new_bet_is_pending() {
        let bet = sample_bet(100, dec!(1.8));
        assert!(bet.is_pending());
        assert_eq!(bet.payout, 0);
        assert!(bet.bet_id.as_str().starts_with("bet_"));
        assert!(!BetOutcome::Pending.is_terminal());
        assert!(BetOutcome::Void.is_terminal());
    }

    #[test]
    fn test_bet_ids_unique() {
        assert_ne!(BetId::new(), BetId::new());
    }
}
