//! Ledger balance types.
//!
//! A user's funds are partitioned into `available` (spendable) and
//! `frozen` (committed to pending bets). Both are non-negative integers in
//! minor currency units and are only ever changed through a `BalanceDelta`.

use serde::{Deserialize, Serialize};

/// Amount in minor currency units.
pub type Amount = u64;

/// Per-user balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Balance {
    pub available: Amount,
    pub frozen: Amount,
}

impl Balance {
    pub fn new(available: Amount, frozen: Amount) -> Self {
        Self { available, frozen }
    }

    /// Total funds owned by the user.
    #[must_use]
    pub fn total(&self) -> u128 {
        u128::from(self.available) + u128::from(self.frozen)
    }

    /// Apply a delta, returning `None` if either side would go negative
    /// or overflow.
    #[must_use]
    pub fn apply(&self, delta: BalanceDelta) -> Option<Balance> {
        let available = i128::from(self.available) + delta.available;
        let frozen = i128::from(self.frozen) + delta.frozen;
        Some(Balance {
            available: Amount::try_from(available).ok()?,
            frozen: Amount::try_from(frozen).ok()?,
        })
    }
}

/// Signed change to a balance, applied atomically by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceDelta {
    pub available: i128,
    pub frozen: i128,
}

impl BalanceDelta {
    /// Move `amount` from available to frozen.
    pub fn freeze(amount: Amount) -> Self {
        Self {
            available: -i128::from(amount),
            frozen: i128::from(amount),
        }
    }

    /// Move `amount` from frozen back to available.
    pub fn release_to_available(amount: Amount) -> Self {
        Self {
            available: i128::from(amount),
            frozen: -i128::from(amount),
        }
    }

    /// Remove `amount` from frozen without returning it.
    pub fn release_and_discard(amount: Amount) -> Self {
        Self {
            available: 0,
            frozen: -i128::from(amount),
        }
    }

    /// Add `amount` to available.
    pub fn credit(amount: Amount) -> Self {
        Self {
            available: i128::from(amount),
            frozen: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freeze_moves_funds() {
        let balance = Balance::new(100_000, 0);
        let after = balance.apply(BalanceDelta::freeze(20_000)).unwrap();
        assert_eq!(after, Balance::new(80_000, 20_000));
        assert_eq!(after.total(), balance.total());
    }

    #[test]
    fn test_freeze_rejects_overdraft() {
        let balance = Balance::new(10, 0);
        assert!(balance.apply(BalanceDelta::freeze(11)).is_none());
        assert_eq!(
            balance.apply(BalanceDelta::freeze(10)),
            Some(Balance::new(0, 10))
        );
    }

    #[test]
    fn test_release_requires_frozen() {
        let balance = Balance::new(0, 5);
        assert!(balance.apply(BalanceDelta::release_to_available(6)).is_none());
        assert!(balance.apply(BalanceDelta::release_and_discard(6)).is_none());
        assert_eq!(
            balance.apply(BalanceDelta::release_and_discard(5)),
            Some(Balance::new(0, 0))
        );
    }

    #[test]
    fn test_credit_overflow_rejected() {
        let balance = Balance::new(Amount::MAX, 0);
        assert!(balance.apply(BalanceDelta::credit(1)).is_none());
    }
}
