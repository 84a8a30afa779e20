//! User balances.
//!
//! Every mutation is a single conditional delta at the store; the ledger
//! never reads a balance and writes it back. A rejected release means the
//! frozen side has drifted from the pending bets, which halts the user.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use updown_core::{Amount, Balance, BalanceDelta, UserId};
use updown_store::{DeltaOutcome, SessionStore};
use updown_telemetry::Metrics;

use crate::call::bounded;
use crate::error::{EngineError, EngineResult};
use crate::halt::AccountHalts;
use crate::notifier::{EngineEvent, Notifier};

/// Balance operations over a [`SessionStore`].
pub struct Ledger {
    store: Arc<dyn SessionStore>,
    halts: Arc<AccountHalts>,
    notifier: Notifier,
    store_timeout: Duration,
}

impl Ledger {
    pub fn new(
        store: Arc<dyn SessionStore>,
        halts: Arc<AccountHalts>,
        notifier: Notifier,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            halts,
            notifier,
            store_timeout,
        }
    }

    /// Fail `AccountHalted` if `user` is halted.
    pub fn ensure_not_halted(&self, user: &UserId) -> EngineResult<()> {
        match self.halts.reason(user) {
            Some(reason) => Err(EngineError::AccountHalted {
                user: user.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Move `amount` from available to frozen.
    ///
    /// Fails `InsufficientFunds` if `available < amount`; nothing is
    /// written in that case.
    pub async fn freeze(
        &self,
        user: &UserId,
        amount: Amount,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Balance> {
        match self
            .apply("freeze", user, BalanceDelta::freeze(amount), cancel)
            .await?
        {
            DeltaOutcome::Applied(balance) => Ok(balance),
            DeltaOutcome::Rejected(balance) => Err(EngineError::InsufficientFunds {
                user: user.clone(),
                requested: amount,
                available: balance.available,
            }),
        }
    }

    /// Move `amount` from frozen back to available.
    pub async fn release_to_available(
        &self,
        user: &UserId,
        amount: Amount,
    ) -> EngineResult<Balance> {
        let delta = BalanceDelta::release_to_available(amount);
        match self.apply("release_to_available", user, delta, None).await? {
            DeltaOutcome::Applied(balance) => Ok(balance),
            DeltaOutcome::Rejected(balance) => Err(self.violation(
                user,
                format!("release_to_available {amount} with frozen {}", balance.frozen),
            )),
        }
    }

    /// Remove `amount` from frozen; the house keeps it.
    pub async fn release_and_discard(
        &self,
        user: &UserId,
        amount: Amount,
    ) -> EngineResult<Balance> {
        let delta = BalanceDelta::release_and_discard(amount);
        match self.apply("release_and_discard", user, delta, None).await? {
            DeltaOutcome::Applied(balance) => Ok(balance),
            DeltaOutcome::Rejected(balance) => Err(self.violation(
                user,
                format!("release_and_discard {amount} with frozen {}", balance.frozen),
            )),
        }
    }

    /// Add `amount` to available.
    ///
    /// Only an overflow can reject a credit, which is treated as drift.
    pub async fn credit(&self, user: &UserId, amount: Amount) -> EngineResult<Balance> {
        match self
            .apply("credit", user, BalanceDelta::credit(amount), None)
            .await?
        {
            DeltaOutcome::Applied(balance) => Ok(balance),
            DeltaOutcome::Rejected(balance) => Err(self.violation(
                user,
                format!("credit {amount} overflows available {}", balance.available),
            )),
        }
    }

    /// Fund a user from outside the engine.
    ///
    /// Unlike [`Ledger::credit`] an overflow here is the caller's mistake
    /// and is reported as `InvalidAmount`.
    pub async fn deposit(&self, user: &UserId, amount: Amount) -> EngineResult<Balance> {
        if amount == 0 {
            return Err(EngineError::InvalidAmount {
                amount,
                min: 1,
                max: Amount::MAX,
            });
        }
        match self
            .apply("deposit", user, BalanceDelta::credit(amount), None)
            .await?
        {
            DeltaOutcome::Applied(balance) => {
                debug!(user = %user, amount, available = balance.available, "Deposit credited");
                Ok(balance)
            }
            DeltaOutcome::Rejected(balance) => Err(EngineError::InvalidAmount {
                amount,
                min: 1,
                max: Amount::MAX - balance.available,
            }),
        }
    }

    /// Current balance. Reads are allowed for halted users.
    pub async fn balance(&self, user: &UserId) -> EngineResult<Balance> {
        bounded(
            "get_balance",
            self.store_timeout,
            None,
            self.store.get_balance(user.clone()),
        )
        .await
    }

    async fn apply(
        &self,
        op: &'static str,
        user: &UserId,
        delta: BalanceDelta,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<DeltaOutcome> {
        self.ensure_not_halted(user)?;
        bounded(
            op,
            self.store_timeout,
            cancel,
            self.store.apply_balance_delta(user.clone(), delta),
        )
        .await
    }

    fn violation(&self, user: &UserId, detail: String) -> EngineError {
        error!(user = %user, detail = %detail, "Ledger invariant violated");
        Metrics::invariant_violation();
        if self.halts.trigger(user, &detail) {
            self.notifier.publish(EngineEvent::AccountHalted {
                user: user.clone(),
                reason: detail.clone(),
            });
        }
        EngineError::InvariantViolation {
            user: user.clone(),
            detail,
        }
    }
}
