//! Engine facade.
//!
//! Wires the ledger, bet book, session manager and notifier over one
//! store and exposes the operations consumed by the API layer, admin
//! tooling and the ticker.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use updown_core::{
    Amount, Balance, Bet, Direction, Page, PageRequest, Session, SessionKey, UserId,
};
use updown_store::SessionStore;
use updown_telemetry::Metrics;

use crate::bet_book::BetBook;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::halt::AccountHalts;
use crate::ledger::Ledger;
use crate::notifier::{EngineEvent, Notifier};
use crate::report::{ResumeReport, SettlementReport, VoidReport};
use crate::session_manager::SessionManager;

/// What one tick achieved.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Current session, if the ensure stage succeeded.
    pub current: Option<Session>,
    /// Sessions locked by this tick.
    pub locked: Vec<Session>,
    /// Sessions voided by this tick for want of a result.
    pub voided: Vec<VoidReport>,
    /// Stages that failed and will be retried next tick.
    pub failed_stages: Vec<&'static str>,
}

impl TickReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed_stages.is_empty()
    }

    /// Record a failed stage. Returns `false` if the pass was cancelled.
    fn stage_failed(&mut self, stage: &'static str, error: &EngineError) -> bool {
        if *error == EngineError::Cancelled {
            debug!(stage, "Tick cancelled");
            return false;
        }
        warn!(stage, error = %error, "Tick stage failed");
        Metrics::tick_failure(stage);
        self.failed_stages.push(stage);
        true
    }
}

/// Settlement engine for one asset.
pub struct Engine {
    config: Arc<EngineConfig>,
    halts: Arc<AccountHalts>,
    notifier: Notifier,
    ledger: Arc<Ledger>,
    bets: BetBook,
    sessions: SessionManager,
}

impl Engine {
    /// Build an engine over `store`. Fails `InvalidConfig` on a bad config.
    pub fn new(config: EngineConfig, store: Arc<dyn SessionStore>) -> EngineResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let halts = Arc::new(AccountHalts::new());
        let notifier = Notifier::new(config.notifier_capacity);
        let ledger = Arc::new(Ledger::new(
            Arc::clone(&store),
            Arc::clone(&halts),
            notifier.clone(),
            config.store_timeout(),
        ));
        let bets = BetBook::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            notifier.clone(),
            Arc::clone(&config),
        );
        let sessions = SessionManager::new(
            store,
            Arc::clone(&ledger),
            notifier.clone(),
            Arc::clone(&config),
        );

        Ok(Self {
            config,
            halts,
            notifier,
            ledger,
            bets,
            sessions,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn asset(&self) -> &str {
        &self.config.asset
    }

    // ---------------------------------------------------------------
    // Users
    // ---------------------------------------------------------------

    /// Place a bet against a specific session.
    pub async fn place_bet(
        &self,
        session: &SessionKey,
        user: &UserId,
        direction: Direction,
        amount: Amount,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Bet> {
        self.bets
            .place_bet(session, user, direction, amount, now, cancel)
            .await
    }

    /// Place a bet against the session containing `now`, opening it if needed.
    pub async fn place_current_bet(
        &self,
        user: &UserId,
        direction: Direction,
        amount: Amount,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Bet> {
        let session = self.ensure_current_session(now, cancel).await?;
        self.place_bet(&session.key, user, direction, amount, now, cancel)
            .await
    }

    /// Open the session containing `now`, locking the expired one first.
    pub async fn ensure_current_session(
        &self,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<Session> {
        self.sessions
            .ensure_current_session(&self.config.asset, now, cancel)
            .await
    }

    pub async fn current_session(&self, now: DateTime<Utc>) -> EngineResult<Option<Session>> {
        self.sessions.current_session(&self.config.asset, now).await
    }

    /// A user's bets, newest first. `page` is 1-based.
    pub async fn bet_history(
        &self,
        user: &UserId,
        page: usize,
        limit: usize,
    ) -> EngineResult<Page<Bet>> {
        let request = PageRequest::new(page, limit)?;
        self.bets.bet_history(user, request).await
    }

    /// Sessions of `asset` (the engine's own by default), newest first.
    pub async fn session_history(
        &self,
        asset: Option<&str>,
        page: usize,
        limit: usize,
    ) -> EngineResult<Page<Session>> {
        let request = PageRequest::new(page, limit)?;
        let asset = asset.unwrap_or(&self.config.asset);
        self.sessions.session_history(asset, request).await
    }

    pub async fn balance(&self, user: &UserId) -> EngineResult<Balance> {
        self.ledger.balance(user).await
    }

    /// Credit funds approved by the funding workflow.
    pub async fn deposit(&self, user: &UserId, amount: Amount) -> EngineResult<Balance> {
        self.ledger.deposit(user, amount).await
    }

    // ---------------------------------------------------------------
    // Admin
    // ---------------------------------------------------------------

    /// Apply an oracle result. `cancel` is honoured until the session
    /// is SETTLED; the payout fan-out is never cancelled.
    pub async fn settle(
        &self,
        session: &SessionKey,
        result: Direction,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<SettlementReport> {
        self.sessions.settle(session, result, now, cancel).await
    }

    pub async fn void(
        &self,
        session: &SessionKey,
        reason: &str,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<VoidReport> {
        self.sessions.void(session, reason, now, cancel).await
    }

    pub async fn resume_settlement(
        &self,
        session: &SessionKey,
        now: DateTime<Utc>,
        cancel: Option<&CancellationToken>,
    ) -> EngineResult<ResumeReport> {
        self.sessions.resume_settlement(session, now, cancel).await
    }

    /// Lift the halt on `user` after manual reconciliation.
    pub fn reset_halt(&self, user: &UserId) -> bool {
        self.halts.reset(user)
    }

    pub fn halt_reason(&self, user: &UserId) -> Option<String> {
        self.halts.reason(user)
    }

    pub fn halted_accounts(&self) -> Vec<UserId> {
        self.halts.halted_users()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.notifier.subscribe()
    }

    // ---------------------------------------------------------------
    // Ticker
    // ---------------------------------------------------------------

    /// One scheduler pass: lock expired sessions, open the current one,
    /// void overdue ones.
    ///
    /// Never fails. A failing stage is logged, counted and retried on the
    /// next tick; later stages still run. A cancelled pass stops at the
    /// stage it was in.
    pub async fn tick(&self, now: DateTime<Utc>, cancel: Option<&CancellationToken>) -> TickReport {
        let mut report = TickReport::default();

        match self.sessions.lock_expired_sessions(now, cancel).await {
            Ok(locked) => report.locked = locked,
            Err(e) => {
                if !report.stage_failed("lock_expired_sessions", &e) {
                    return report;
                }
            }
        }

        match self.ensure_current_session(now, cancel).await {
            Ok(session) => report.current = Some(session),
            Err(e) => {
                if !report.stage_failed("ensure_current_session", &e) {
                    return report;
                }
            }
        }

        match self.sessions.void_overdue_sessions(now, cancel).await {
            Ok(voided) => report.voided = voided,
            Err(e) => {
                report.stage_failed("void_overdue_sessions", &e);
            }
        }

        if !report.locked.is_empty() || !report.voided.is_empty() {
            debug!(
                locked = report.locked.len(),
                voided = report.voided.len(),
                "Tick advanced sessions"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use updown_core::SessionStatus;
    use updown_store::MemoryStore;

    fn at(m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 8, 10, m, s).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = EngineConfig {
            min_trade: 0,
            ..Default::default()
        };
        let result = Engine::new(config, Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn test_balance_of_unknown_user_is_zero() {
        let engine = Engine::new(EngineConfig::default(), Arc::new(MemoryStore::new())).unwrap();
        let balance = tokio_test::block_on(engine.balance(&UserId::from("nobody"))).unwrap();
        assert_eq!(balance, Balance::default());
    }

    #[tokio::test]
    async fn test_tick_opens_and_locks() {
        let engine = Engine::new(EngineConfig::default(), Arc::new(MemoryStore::new())).unwrap();

        let report = engine.tick(at(15, 0), None).await;
        assert!(report.is_clean());
        let opened = report.current.unwrap();
        assert_eq!(opened.status, SessionStatus::Open);

        let report = engine.tick(at(16, 0), None).await;
        assert_eq!(report.locked.len(), 1);
        assert_eq!(report.locked[0].key, opened.key);
        assert_ne!(report.current.unwrap().key, opened.key);
    }

    #[tokio::test]
    async fn test_tick_swallows_store_outage() {
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::new(EngineConfig::default(), store.clone()).unwrap();

        store.set_available(false);
        let report = engine.tick(at(15, 0), None).await;
        assert!(report.current.is_none());
        assert_eq!(
            report.failed_stages,
            vec!["lock_expired_sessions", "ensure_current_session"]
        );

        store.set_available(true);
        assert!(engine.tick(at(15, 1), None).await.is_clean());
    }

    #[tokio::test]
    async fn test_tick_locks_before_opening() {
        let engine = Engine::new(EngineConfig::default(), Arc::new(MemoryStore::new())).unwrap();
        engine.tick(at(15, 0), None).await;
        let mut events = engine.subscribe();

        engine.tick(at(16, 0), None).await;
        assert_eq!(events.recv().await.unwrap().kind(), "session_locked");
        assert_eq!(events.recv().await.unwrap().kind(), "session_opened");
    }

    #[tokio::test]
    async fn test_cancelled_tick_is_not_a_failure() {
        let engine = Engine::new(EngineConfig::default(), Arc::new(MemoryStore::new())).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let report = engine.tick(at(15, 0), Some(&token)).await;
        assert!(report.is_clean());
        assert!(report.current.is_none());
        assert!(engine.current_session(at(15, 0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_rejects_bad_page() {
        let engine = Engine::new(EngineConfig::default(), Arc::new(MemoryStore::new())).unwrap();
        let err = engine
            .bet_history(&UserId::from("u1"), 0, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest(_)));
        assert!(err.is_user_facing());
    }

    #[tokio::test]
    async fn test_place_current_bet_opens_session() {
        let engine = Engine::new(EngineConfig::default(), Arc::new(MemoryStore::new())).unwrap();
        let user = UserId::from("u1");
        engine.deposit(&user, 50_000).await.unwrap();

        let bet = engine
            .place_current_bet(&user, Direction::Down, 10_000, at(15, 30), None)
            .await
            .unwrap();
        assert_eq!(bet.session.id.as_str(), "2507081015");
        assert_eq!(
            engine.balance(&user).await.unwrap(),
            Balance::new(40_000, 10_000)
        );
        let history = engine.session_history(None, 1, 10).await.unwrap();
        assert_eq!(history.total, 1);
    }
}
