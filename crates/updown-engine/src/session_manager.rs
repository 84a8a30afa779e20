//! Session lifecycle and settlement fan-out.
//!
//! Status moves `OPEN -> LOCKED -> {SETTLED | VOID}` (or `OPEN -> VOID`)
//! through compare-and-set at the store. The fan-out over a session's bets
//! runs after the session's own transition and is idempotent per bet: each
//! bet moves out of `PENDING` by its own compare-and-set before any money
//! moves, so a retried pass only touches bets still `PENDING`.
//!
//! Cancellation is honoured up to the terminal status compare-and-set.
//! Once a session is SETTLED or VOID the fan-out runs to completion or to
//! the first store error.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use updown_core::{
    Bet, BetOutcome, Direction, Page, PageRequest, Session, SessionKey, SessionStatus,
};
use updown_store::{CasOutcome, SessionStore};
use updown_telemetry::Metrics;

use crate::call::bounded;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::ledger::Ledger;
use crate::notifier::{EngineEvent, Notifier};
use crate::report::{BetFailure, ResumeReport, SettlementReport, VoidReport};

/// Reason recorded on sessions voided by the ticker.
pub const AUTO_VOID_REASON: &str = "no result reported";

/// Owns session state transitions.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    ledger: Arc<Ledger>,
    notifier: Notifier,
    config: Arc<EngineConfig>,
}

impl SessionManager {
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
        }
    }

    /// Session of `asset` whose window contains `now`, created OPEN if absent.
    ///
    /// Expired OPEN sessions of `asset` are locked first, so at most one
    /// session per asset is OPEN. Concurrent callers converge on the same
    /// session: the loser of the create race gets the winner's record.
    pub async fn ensure_current_session(
        &self,
        asset: &str,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Session> {
        self.lock_expired(Some(asset), now, cancel).await?;

        let candidate = Session::open_at(asset, now);
        let outcome = bounded(
            "create_session_if_absent",
            self.config.store_timeout(),
            cancel,
            self.store.create_session_if_absent(candidate),
        )
        .await?;

        if outcome.was_created() {
            let session = outcome.session();
            info!(
                session = %session.key,
                start = %session.start_time,
                end = %session.end_time,
                "Session opened"
            );
            Metrics::session_transition(asset, SessionStatus::Open.as_str());
            self.notifier.publish(EngineEvent::SessionOpened {
                session: session.clone(),
            });
        }
        Ok(outcome.into_session())
    }

    /// Session of `asset` whose window contains `now`, if it exists.
    pub async fn current_session(
        &self,
        asset: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<Session>> {
        self.get(&SessionKey::for_instant(asset, now), None).await
    }

    /// Lock every OPEN session whose boundary has passed.
    ///
    /// Returns the sessions this call locked. Sessions advanced by another
    /// writer in the meantime are skipped.
    pub async fn lock_expired_sessions(
        &self,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Vec<Session>> {
        self.lock_expired(None, now, cancel).await
    }

    /// Apply `result` to a LOCKED session and pay out its bets.
    ///
    /// An OPEN session whose boundary has passed is locked first, so a
    /// result arriving ahead of the tick is not refused.
    pub async fn settle(
        &self,
        key: &SessionKey,
        result: Direction,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<SettlementReport> {
        let started = Instant::now();
        let session = self.require(key, cancel).await?;

        match session.status {
            SessionStatus::Settled => return Err(EngineError::AlreadySettled(key.clone())),
            SessionStatus::Void => return Err(EngineError::AlreadyVoided(key.clone())),
            SessionStatus::Open if !session.has_expired(now) => {
                return Err(EngineError::SessionNotLocked(key.clone()));
            }
            SessionStatus::Open => {
                self.lock(key, now, cancel).await?;
            }
            SessionStatus::Locked => {}
        }
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(EngineError::Cancelled);
        }

        let cas = bounded(
            "compare_and_set_status",
            self.config.store_timeout(),
            None,
            self.store.compare_and_set_status(
                key.clone(),
                SessionStatus::Locked,
                SessionStatus::Settled,
                Some(result),
                None,
                now,
            ),
        )
        .await?;
        let settled = match cas {
            CasOutcome::Applied(session) => session,
            CasOutcome::Conflict(current) => return Err(terminal_conflict(current)),
        };
        Metrics::session_transition(&key.asset, SessionStatus::Settled.as_str());
        info!(session = %key, result = %result, "Session settled, paying out");

        let mut report = SettlementReport::new(key.clone(), result, now);
        let applied = self.apply_result(&settled, result, now, &mut report).await;
        self.finish_settlement(&mut report, "settle", started, applied.as_ref().err());
        applied.map(|()| report)
    }

    /// Cancel an OPEN or LOCKED session and refund its bets.
    pub async fn void(
        &self,
        key: &SessionKey,
        reason: &str,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<VoidReport> {
        let started = Instant::now();
        let mut session = self.require(key, cancel).await?;
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(EngineError::Cancelled);
        }

        // OPEN may become LOCKED under us; retry from the observed status
        let voided = loop {
            match session.status {
                SessionStatus::Settled => return Err(EngineError::AlreadySettled(key.clone())),
                SessionStatus::Void => return Err(EngineError::AlreadyVoided(key.clone())),
                SessionStatus::Open | SessionStatus::Locked => {}
            }
            let from = session.status;
            let cas = bounded(
                "compare_and_set_status",
                self.config.store_timeout(),
                None,
                self.store.compare_and_set_status(
                    key.clone(),
                    from,
                    SessionStatus::Void,
                    None,
                    Some(reason.to_string()),
                    now,
                ),
            )
            .await?;
            match cas {
                CasOutcome::Applied(voided) => {
                    if from == SessionStatus::Open {
                        Metrics::session_closed_for_bets(&key.asset);
                    }
                    break voided;
                }
                CasOutcome::Conflict(current) => session = current,
            }
        };
        Metrics::session_transition(&key.asset, SessionStatus::Void.as_str());
        info!(session = %key, reason, "Session voided, refunding");

        let mut report = VoidReport::new(key.clone(), reason.to_string(), now);
        let refunded = self.refund_all(&voided, now, &mut report).await;
        self.finish_void(&mut report, "void", started, refunded.as_ref().err());
        refunded.map(|()| report)
    }

    /// Void LOCKED sessions whose boundary passed `auto_void_after` ago.
    ///
    /// Does nothing unless `auto_void_after_secs` is configured.
    pub async fn void_overdue_sessions(
        &self,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Vec<VoidReport>> {
        let Some(grace) = self.config.auto_void_after() else {
            return Ok(Vec::new());
        };

        let locked = bounded(
            "list_sessions_with_status",
            self.config.store_timeout(),
            cancel,
            self.store.list_sessions_with_status(SessionStatus::Locked),
        )
        .await?;

        let overdue = locked.into_iter().filter(|s| {
            s.end_time
                .checked_add_signed(grace)
                .is_some_and(|deadline| deadline <= now)
        });
        let mut reports = Vec::new();
        for session in overdue {
            match self.void(&session.key, AUTO_VOID_REASON, now, cancel).await {
                Ok(report) => reports.push(report),
                // Settled or voided by someone else since the listing
                Err(e) if e.is_already_terminal() => {
                    debug!(session = %session.key, "Overdue session already closed");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(reports)
    }

    /// Finish an interrupted fan-out on a SETTLED or VOID session.
    ///
    /// Only bets still `PENDING` are processed; the session status is never
    /// changed.
    pub async fn resume_settlement(
        &self,
        key: &SessionKey,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<ResumeReport> {
        let started = Instant::now();
        let session = self.require(key, cancel).await?;

        match (session.status, session.result) {
            (SessionStatus::Settled, Some(result)) => {
                let mut report = SettlementReport::new(key.clone(), result, now);
                let applied = self.apply_result(&session, result, now, &mut report).await;
                info!(
                    session = %key,
                    processed = report.bets_processed(),
                    skipped = report.bets_skipped,
                    "Settlement resumed"
                );
                self.finish_settlement(&mut report, "resume", started, applied.as_ref().err());
                applied.map(|()| ResumeReport::Settled(report))
            }
            (SessionStatus::Void, _) => {
                let reason = session.void_reason.clone().unwrap_or_default();
                let mut report = VoidReport::new(key.clone(), reason, now);
                let refunded = self.refund_all(&session, now, &mut report).await;
                info!(
                    session = %key,
                    refunded = report.bets_voided,
                    skipped = report.bets_skipped,
                    "Void resumed"
                );
                self.finish_void(&mut report, "resume", started, refunded.as_ref().err());
                refunded.map(|()| ResumeReport::Voided(report))
            }
            _ => Err(EngineError::NotSettled(key.clone())),
        }
    }

    /// Sessions of `asset`, newest first.
    pub async fn session_history(
        &self,
        asset: &str,
        page: PageRequest,
    ) -> EngineResult<Page<Session>> {
        bounded(
            "list_sessions",
            self.config.store_timeout(),
            None,
            self.store.list_sessions(asset.to_string(), page),
        )
        .await
    }

    async fn get(
        &self,
        key: &SessionKey,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Option<Session>> {
        bounded(
            "get_session",
            self.config.store_timeout(),
            cancel,
            self.store.get_session(key.clone()),
        )
        .await
    }

    async fn require(
        &self,
        key: &SessionKey,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Session> {
        self.get(key, cancel)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(key.clone()))
    }

    /// Lock expired OPEN sessions, of one asset or of all.
    async fn lock_expired(
        &self,
        asset: Option<&str>,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Vec<Session>> {
        let open = bounded(
            "list_sessions_with_status",
            self.config.store_timeout(),
            cancel,
            self.store.list_sessions_with_status(SessionStatus::Open),
        )
        .await?;

        let expired = open.into_iter().filter(|s| {
            s.has_expired(now) && asset.map_or(true, |asset| s.key.asset == asset)
        });
        let mut locked = Vec::new();
        for session in expired {
            if let Some(session) = self.lock(&session.key, now, cancel).await? {
                locked.push(session);
            }
        }
        Ok(locked)
    }

    /// OPEN -> LOCKED. `None` if another writer moved the session first.
    async fn lock(
        &self,
        key: &SessionKey,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Option<Session>> {
        let cas = bounded(
            "compare_and_set_status",
            self.config.store_timeout(),
            cancel,
            self.store.compare_and_set_status(
                key.clone(),
                SessionStatus::Open,
                SessionStatus::Locked,
                None,
                None,
                now,
            ),
        )
        .await?;

        match cas {
            CasOutcome::Applied(session) => {
                debug!(session = %key, "Session locked");
                Metrics::session_transition(&key.asset, SessionStatus::Locked.as_str());
                Metrics::session_closed_for_bets(&key.asset);
                self.notifier.publish(EngineEvent::SessionLocked {
                    session: session.clone(),
                });
                Ok(Some(session))
            }
            CasOutcome::Conflict(_) => Ok(None),
        }
    }

    async fn list_bets(&self, key: &SessionKey) -> EngineResult<Vec<Bet>> {
        bounded(
            "list_session_bets",
            self.config.store_timeout(),
            None,
            self.store.list_session_bets(key.clone()),
        )
        .await
    }

    /// Move a bet out of PENDING. `None` if it was already terminal.
    async fn transition_bet(
        &self,
        bet: &Bet,
        outcome: BetOutcome,
        payout: u64,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<Bet>> {
        let cas = bounded(
            "compare_and_set_outcome",
            self.config.store_timeout(),
            None,
            self.store.compare_and_set_outcome(
                bet.bet_id.clone(),
                BetOutcome::Pending,
                outcome,
                payout,
                now,
            ),
        )
        .await?;
        Ok(match cas {
            CasOutcome::Applied(bet) => Some(bet),
            CasOutcome::Conflict(_) => None,
        })
    }

    /// Settle every PENDING bet of `session` against `result` into `report`.
    ///
    /// A store error on a bet's own transition aborts the pass; the rest can
    /// be finished with `resume_settlement`. A ledger error after the
    /// transition is recorded as a failure and the pass continues.
    async fn apply_result(
        &self,
        session: &Session,
        result: Direction,
        now: DateTime<Utc>,
        report: &mut SettlementReport,
    ) -> EngineResult<()> {
        let asset = session.asset();

        for bet in self.list_bets(&session.key).await? {
            if !bet.is_pending() {
                report.bets_skipped += 1;
                continue;
            }
            if let Err(e) = self.ledger.ensure_not_halted(&bet.user_id) {
                report.failures.push(failure(&bet, &e));
                continue;
            }

            let outcome = bet.outcome_for(result);
            let payout = match outcome {
                BetOutcome::Won => match bet.winning_payout() {
                    Some(payout) => payout,
                    None => {
                        error!(bet_id = %bet.bet_id, amount = bet.amount, "Payout overflows");
                        report.failures.push(BetFailure {
                            bet_id: bet.bet_id.clone(),
                            user_id: bet.user_id.clone(),
                            error: "payout overflow".to_string(),
                        });
                        continue;
                    }
                },
                _ => 0,
            };

            let Some(settled) = self.transition_bet(&bet, outcome, payout, now).await? else {
                report.bets_skipped += 1;
                continue;
            };

            let moved = match outcome {
                BetOutcome::Won => self.pay_winner(&settled).await,
                _ => self
                    .ledger
                    .release_and_discard(&settled.user_id, settled.amount)
                    .await
                    .map(|_| ()),
            };
            if let Err(e) = moved {
                error!(
                    bet_id = %settled.bet_id,
                    user = %settled.user_id,
                    outcome = %outcome,
                    error = %e,
                    "Ledger update failed for settled bet"
                );
                report.failures.push(failure(&settled, &e));
                continue;
            }

            Metrics::bet_settled(asset, outcome.as_str());
            report.total_staked += settled.amount;
            if outcome == BetOutcome::Won {
                Metrics::payout(asset, settled.payout);
                report.bets_won += 1;
                report.total_payout += settled.payout;
            } else {
                report.bets_lost += 1;
            }
        }
        Ok(())
    }

    /// Return the stake, then credit the profit.
    async fn pay_winner(&self, bet: &Bet) -> EngineResult<()> {
        self.ledger
            .release_to_available(&bet.user_id, bet.amount)
            .await?;
        let profit = bet.payout.saturating_sub(bet.amount);
        if profit > 0 {
            self.ledger.credit(&bet.user_id, profit).await?;
        }
        Ok(())
    }

    /// Void and refund every PENDING bet of `session` into `report`.
    async fn refund_all(
        &self,
        session: &Session,
        now: DateTime<Utc>,
        report: &mut VoidReport,
    ) -> EngineResult<()> {
        let asset = session.asset();

        for bet in self.list_bets(&session.key).await? {
            if !bet.is_pending() {
                report.bets_skipped += 1;
                continue;
            }
            if let Err(e) = self.ledger.ensure_not_halted(&bet.user_id) {
                report.failures.push(failure(&bet, &e));
                continue;
            }

            let Some(voided) = self.transition_bet(&bet, BetOutcome::Void, 0, now).await? else {
                report.bets_skipped += 1;
                continue;
            };

            match self
                .ledger
                .release_to_available(&voided.user_id, voided.amount)
                .await
            {
                Ok(_) => {
                    Metrics::bet_settled(asset, BetOutcome::Void.as_str());
                    Metrics::refund(asset, voided.amount);
                    report.bets_voided += 1;
                    report.total_refunded += voided.amount;
                }
                Err(e) => {
                    error!(
                        bet_id = %voided.bet_id,
                        user = %voided.user_id,
                        error = %e,
                        "Refund failed for voided bet"
                    );
                    report.failures.push(failure(&voided, &e));
                }
            }
        }
        Ok(())
    }

    /// Record and publish a settlement pass, complete or not.
    ///
    /// The session is already SETTLED, so the event goes out either way.
    fn finish_settlement(
        &self,
        report: &mut SettlementReport,
        kind: &str,
        started: Instant,
        interrupted: Option<&EngineError>,
    ) {
        Metrics::settlement_duration(
            &report.session.asset,
            kind,
            started.elapsed().as_secs_f64() * 1000.0,
        );
        if let Some(e) = interrupted {
            error!(
                session = %report.session,
                processed = report.bets_processed(),
                error = %e,
                "Settlement interrupted, resume required"
            );
            report.interrupted = Some(e.to_string());
        } else {
            info!(
                session = %report.session,
                won = report.bets_won,
                lost = report.bets_lost,
                payout = report.total_payout,
                "Settlement complete"
            );
        }
        if !report.failures.is_empty() {
            warn!(
                session = %report.session,
                failures = report.failures.len(),
                "Settlement finished with failures"
            );
        }
        self.notifier.publish(EngineEvent::SessionSettled {
            report: report.clone(),
        });
    }

    /// Record and publish a void pass, complete or not.
    fn finish_void(
        &self,
        report: &mut VoidReport,
        kind: &str,
        started: Instant,
        interrupted: Option<&EngineError>,
    ) {
        Metrics::settlement_duration(
            &report.session.asset,
            kind,
            started.elapsed().as_secs_f64() * 1000.0,
        );
        if let Some(e) = interrupted {
            error!(
                session = %report.session,
                voided = report.bets_voided,
                error = %e,
                "Void interrupted, resume required"
            );
            report.interrupted = Some(e.to_string());
        } else {
            info!(
                session = %report.session,
                voided = report.bets_voided,
                refunded = report.total_refunded,
                "Void complete"
            );
        }
        if !report.failures.is_empty() {
            warn!(
                session = %report.session,
                failures = report.failures.len(),
                "Void finished with failures"
            );
        }
        self.notifier.publish(EngineEvent::SessionVoided {
            report: report.clone(),
        });
    }
}

fn failure(bet: &Bet, error: &EngineError) -> BetFailure {
    BetFailure {
        bet_id: bet.bet_id.clone(),
        user_id: bet.user_id.clone(),
        error: error.to_string(),
    }
}

/// Map a lost LOCKED -> terminal race to the error the caller sees.
fn terminal_conflict(current: Session) -> EngineError {
    match current.status {
        SessionStatus::Settled => EngineError::AlreadySettled(current.key),
        SessionStatus::Void => EngineError::AlreadyVoided(current.key),
        SessionStatus::Open | SessionStatus::Locked => EngineError::SessionNotLocked(current.key),
    }
}
