//! Bet placement and history.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use updown_core::{Amount, Bet, BetOutcome, Direction, Page, PageRequest, SessionKey, UserId};
use updown_store::{CasOutcome, SessionStore};
use updown_telemetry::Metrics;

use crate::call::bounded;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::ledger::Ledger;
use crate::notifier::{EngineEvent, Notifier};

/// Records bets against sessions and freezes their stake.
pub struct BetBook {
    store: Arc<dyn SessionStore>,
    ledger: Arc<Ledger>,
    notifier: Notifier,
    config: Arc<EngineConfig>,
    /// `(session, user)` pairs with a placement in flight, used when
    /// `one_bet_per_session` is set.
    placing: DashSet<(SessionKey, UserId)>,
}

impl BetBook {
    pub fn new(
        store: Arc<dyn SessionStore>,
        ledger: Arc<Ledger>,
        notifier: Notifier,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            ledger,
            notifier,
            config,
            placing: DashSet::new(),
        }
    }

    /// Place a bet against `key` at `now`.
    ///
    /// Cancellation is honoured up to the freeze. Once funds are frozen the
    /// bet is written regardless, so a cancelled caller may still find it
    /// in their history.
    pub async fn place_bet(
        &self,
        key: &SessionKey,
        user: &UserId,
        direction: Direction,
        amount: Amount,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Bet> {
        let result = if self.config.one_bet_per_session {
            match PlacingSlot::claim(&self.placing, key, user) {
                Some(_slot) => self.place(key, user, direction, amount, now, cancel).await,
                None => Err(EngineError::DuplicateBet {
                    user: user.clone(),
                    session: key.clone(),
                }),
            }
        } else {
            self.place(key, user, direction, amount, now, cancel).await
        };

        match &result {
            Ok(bet) => {
                Metrics::bet_accepted(&key.asset, &bet.direction.to_string(), bet.amount);
                debug!(
                    bet_id = %bet.bet_id,
                    session = %key,
                    user = %user,
                    direction = %direction,
                    amount,
                    "Bet accepted"
                );
                self.notifier
                    .publish(EngineEvent::BetAccepted { bet: bet.clone() });
            }
            Err(e) => {
                Metrics::bet_rejected(e.reason_label());
                if e.is_user_facing() || matches!(e, EngineError::Cancelled) {
                    debug!(session = %key, user = %user, amount, reason = %e, "Bet rejected");
                } else {
                    warn!(session = %key, user = %user, amount, error = %e, "Bet placement failed");
                }
            }
        }
        result
    }

    async fn place(
        &self,
        key: &SessionKey,
        user: &UserId,
        direction: Direction,
        amount: Amount,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Bet> {
        if !self.config.amount_in_bounds(amount) {
            return Err(EngineError::InvalidAmount {
                amount,
                min: self.config.min_trade,
                max: self.config.max_trade,
            });
        }
        self.ledger.ensure_not_halted(user)?;

        let session = bounded(
            "get_session",
            self.config.store_timeout(),
            cancel,
            self.store.get_session(key.clone()),
        )
        .await?
        .ok_or_else(|| EngineError::SessionNotFound(key.clone()))?;

        // Checks the boundary as well: the lock tick may lag it
        if !session.accepts_bets_at(now) {
            return Err(EngineError::SessionNotOpen(key.clone()));
        }

        if self.config.one_bet_per_session {
            let existing = bounded(
                "list_session_bets",
                self.config.store_timeout(),
                cancel,
                self.store.list_session_bets(key.clone()),
            )
            .await?;
            if existing
                .iter()
                .any(|b| &b.user_id == user && b.outcome != BetOutcome::Void)
            {
                return Err(EngineError::DuplicateBet {
                    user: user.clone(),
                    session: key.clone(),
                });
            }
        }

        self.ledger.freeze(user, amount, cancel).await?;

        let bet = Bet::new(
            key.clone(),
            user.clone(),
            direction,
            amount,
            self.config.payout_multiplier,
            now,
        );
        self.insert_or_release(&bet).await?;
        self.reconcile_late_bet(bet).await
    }

    /// Write `bet`, returning its frozen stake if the write did not land.
    async fn insert_or_release(&self, bet: &Bet) -> EngineResult<()> {
        let timeout = self.config.store_timeout();
        let Err(insert_err) = bounded(
            "insert_bet",
            timeout,
            None,
            self.store.insert_bet(bet.clone()),
        )
        .await
        else {
            return Ok(());
        };

        // A timed-out write may still have been applied
        match bounded("get_bet", timeout, None, self.store.get_bet(bet.bet_id.clone())).await {
            Ok(Some(_)) => return Ok(()),
            Ok(None) => {}
            Err(e) => {
                error!(
                    bet_id = %bet.bet_id,
                    user = %bet.user_id,
                    amount = bet.amount,
                    error = %e,
                    "Bet write unconfirmed, stake left frozen"
                );
                return Err(insert_err);
            }
        }

        if let Err(e) = self.ledger.release_to_available(&bet.user_id, bet.amount).await {
            error!(
                bet_id = %bet.bet_id,
                user = %bet.user_id,
                amount = bet.amount,
                error = %e,
                "Failed to release stake of unwritten bet"
            );
        }
        Err(insert_err)
    }

    /// Void a bet whose session left OPEN while it was being written.
    ///
    /// Settlement and void list a session's bets only after their status
    /// transition, so a bet that sees a non-terminal session here is
    /// guaranteed to be picked up by that fan-out.
    async fn reconcile_late_bet(&self, bet: Bet) -> EngineResult<Bet> {
        let timeout = self.config.store_timeout();
        let session = match bounded(
            "get_session",
            timeout,
            None,
            self.store.get_session(bet.session.clone()),
        )
        .await
        {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(bet),
            Err(e) => {
                warn!(
                    bet_id = %bet.bet_id,
                    error = %e,
                    "Could not re-check session after bet write"
                );
                return Ok(bet);
            }
        };

        if !session.status.is_terminal() {
            return Ok(bet);
        }

        let cas = bounded(
            "compare_and_set_outcome",
            timeout,
            None,
            self.store.compare_and_set_outcome(
                bet.bet_id.clone(),
                BetOutcome::Pending,
                BetOutcome::Void,
                0,
                session.updated_at,
            ),
        )
        .await?;

        match cas {
            CasOutcome::Applied(voided) => {
                self.ledger
                    .release_to_available(&voided.user_id, voided.amount)
                    .await?;
                debug!(bet_id = %voided.bet_id, session = %voided.session, "Late bet voided");
                Err(EngineError::SessionNotOpen(voided.session))
            }
            // The session's own fan-out reached it first and refunded it
            CasOutcome::Conflict(current) if current.outcome == BetOutcome::Void => {
                Err(EngineError::SessionNotOpen(current.session))
            }
            CasOutcome::Conflict(current) => Ok(current),
        }
    }

    /// A user's bets, newest first.
    pub async fn bet_history(&self, user: &UserId, page: PageRequest) -> EngineResult<Page<Bet>> {
        bounded(
            "list_user_bets",
            self.config.store_timeout(),
            None,
            self.store.list_user_bets(user.clone(), page),
        )
        .await
    }
}

/// A claimed `(session, user)` placement slot, released on drop so an
/// abandoned placement does not block the user for the whole session.
struct PlacingSlot<'a> {
    placing: &'a DashSet<(SessionKey, UserId)>,
    slot: (SessionKey, UserId),
}

impl<'a> PlacingSlot<'a> {
    fn claim(
        placing: &'a DashSet<(SessionKey, UserId)>,
        key: &SessionKey,
        user: &UserId,
    ) -> Option<Self> {
        let slot = (key.clone(), user.clone());
        placing.insert(slot.clone()).then_some(Self { placing, slot })
    }
}

impl Drop for PlacingSlot<'_> {
    fn drop(&mut self) {
        self.placing.remove(&self.slot);
    }
}
