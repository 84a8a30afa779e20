//! In-memory store backed by DashMap.
//!
//! Each primitive is atomic per record: DashMap holds a shard write lock
//! for the duration of `entry()` / `get_mut()`, so the check and the write
//! of a compare-and-set or conditional increment happen under one lock.
//! Secondary indexes (session -> bets, user -> bets) are appended after the
//! primary record is visible.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use updown_core::{
    Amount, Balance, BalanceDelta, Bet, BetId, BetOutcome, Direction, Page, PageRequest, Session,
    SessionKey, SessionStatus, UserId,
};

use crate::error::{StoreError, StoreResult};
use crate::store::{BoxFuture, CasOutcome, CreateOutcome, DeltaOutcome, SessionStore};

/// Simulated failure of one store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Calls fail `StoreError::Unavailable`.
    Fail,
    /// Calls never complete.
    Stall,
}

/// In-process [`SessionStore`].
#[derive(Debug)]
pub struct MemoryStore {
    sessions: DashMap<SessionKey, Session>,
    bets: DashMap<BetId, Bet>,
    session_bets: DashMap<SessionKey, Vec<BetId>>,
    user_bets: DashMap<UserId, Vec<BetId>>,
    balances: DashMap<UserId, Balance>,
    /// Outage simulation switch.
    available: AtomicBool,
    /// Per-operation faults, keyed by trait method name.
    faults: DashMap<&'static str, Fault>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            bets: DashMap::new(),
            session_bets: DashMap::new(),
            user_bets: DashMap::new(),
            balances: DashMap::new(),
            available: AtomicBool::new(true),
            faults: DashMap::new(),
        }
    }

    /// Set whether the store answers requests.
    ///
    /// While unavailable every call fails `StoreError::Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        debug!(available, "MemoryStore availability changed");
    }

    /// Inject `fault` into calls of `operation` (a [`SessionStore`] method
    /// name) until [`clear_faults`](Self::clear_faults).
    ///
    /// A stalled call stays pending even after the fault is cleared.
    pub fn inject_fault(&self, operation: &'static str, fault: Fault) {
        debug!(operation, ?fault, "MemoryStore fault injected");
        self.faults.insert(operation, fault);
    }

    pub fn clear_faults(&self) {
        self.faults.clear();
    }

    /// Number of sessions stored.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of bets stored.
    pub fn bet_count(&self) -> usize {
        self.bets.len()
    }

    /// Admission check run at the start of every call.
    async fn admit(&self, operation: &'static str) -> StoreResult<()> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        let fault = self.faults.get(operation).map(|f| *f.value());
        match fault {
            None => Ok(()),
            Some(Fault::Fail) => Err(StoreError::Unavailable(format!(
                "{operation} failed (injected)"
            ))),
            Some(Fault::Stall) => std::future::pending().await,
        }
    }

    fn collect_bets(&self, ids: &[BetId]) -> Vec<Bet> {
        ids.iter()
            .filter_map(|id| self.bets.get(id).map(|b| b.value().clone()))
            .collect()
    }

    fn create_session_sync(&self, session: Session) -> CreateOutcome {
        match self.sessions.entry(session.key.clone()) {
            Entry::Occupied(existing) => CreateOutcome::Existing(existing.get().clone()),
            Entry::Vacant(slot) => {
                trace!(session = %session.key, "Session inserted");
                slot.insert(session.clone());
                CreateOutcome::Created(session)
            }
        }
    }

    fn cas_status_sync(
        &self,
        key: &SessionKey,
        expected: SessionStatus,
        new: SessionStatus,
        result: Option<Direction>,
        void_reason: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<CasOutcome<Session>> {
        if !expected.can_transition_to(new) {
            return Err(StoreError::Backend(format!(
                "illegal session transition {expected} -> {new}"
            )));
        }

        let mut session = self
            .sessions
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(format!("session {key}")))?;

        if session.status != expected {
            return Ok(CasOutcome::Conflict(session.clone()));
        }

        session.status = new;
        session.updated_at = at;
        if result.is_some() {
            session.result = result;
        }
        if void_reason.is_some() {
            session.void_reason = void_reason;
        }
        Ok(CasOutcome::Applied(session.clone()))
    }

    fn insert_bet_sync(&self, bet: Bet) -> StoreResult<()> {
        let bet_id = bet.bet_id.clone();
        let session = bet.session.clone();
        let user = bet.user_id.clone();

        match self.bets.entry(bet_id.clone()) {
            Entry::Occupied(_) => return Err(StoreError::Duplicate(format!("bet {bet_id}"))),
            Entry::Vacant(slot) => {
                slot.insert(bet);
            }
        }

        self.session_bets
            .entry(session)
            .or_default()
            .push(bet_id.clone());
        self.user_bets.entry(user).or_default().push(bet_id);
        Ok(())
    }

    fn cas_outcome_sync(
        &self,
        bet_id: &BetId,
        expected: BetOutcome,
        new: BetOutcome,
        payout: Amount,
        at: DateTime<Utc>,
    ) -> StoreResult<CasOutcome<Bet>> {
        if expected != BetOutcome::Pending || !new.is_terminal() {
            return Err(StoreError::Backend(format!(
                "illegal bet transition {expected} -> {new}"
            )));
        }

        let mut bet = self
            .bets
            .get_mut(bet_id)
            .ok_or_else(|| StoreError::NotFound(format!("bet {bet_id}")))?;

        if bet.outcome != expected {
            return Ok(CasOutcome::Conflict(bet.clone()));
        }

        bet.outcome = new;
        bet.payout = payout;
        bet.settled_at = Some(at);
        Ok(CasOutcome::Applied(bet.clone()))
    }

    fn apply_delta_sync(&self, user: UserId, delta: BalanceDelta) -> DeltaOutcome {
        let mut balance = self.balances.entry(user).or_default();
        match balance.apply(delta) {
            Some(next) => {
                *balance = next;
                DeltaOutcome::Applied(next)
            }
            None => DeltaOutcome::Rejected(*balance),
        }
    }
}

impl SessionStore for MemoryStore {
    fn create_session_if_absent(
        &self,
        session: Session,
    ) -> BoxFuture<'_, StoreResult<CreateOutcome>> {
        Box::pin(async move {
            self.admit("create_session_if_absent").await?;
            Ok(self.create_session_sync(session))
        })
    }

    fn get_session(&self, key: SessionKey) -> BoxFuture<'_, StoreResult<Option<Session>>> {
        Box::pin(async move {
            self.admit("get_session").await?;
            Ok(self.sessions.get(&key).map(|s| s.value().clone()))
        })
    }

    fn list_sessions_with_status(
        &self,
        status: SessionStatus,
    ) -> BoxFuture<'_, StoreResult<Vec<Session>>> {
        Box::pin(async move {
            self.admit("list_sessions_with_status").await?;
            let mut sessions: Vec<Session> = self
                .sessions
                .iter()
                .filter(|s| s.status == status)
                .map(|s| s.value().clone())
                .collect();
            sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time));
            Ok(sessions)
        })
    }

    fn list_sessions(
        &self,
        asset: String,
        page: PageRequest,
    ) -> BoxFuture<'_, StoreResult<Page<Session>>> {
        Box::pin(async move {
            self.admit("list_sessions").await?;
            let mut sessions: Vec<Session> = self
                .sessions
                .iter()
                .filter(|s| s.key.asset == asset)
                .map(|s| s.value().clone())
                .collect();
            sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
            Ok(page.paginate(sessions))
        })
    }

    fn compare_and_set_status(
        &self,
        key: SessionKey,
        expected: SessionStatus,
        new: SessionStatus,
        result: Option<Direction>,
        void_reason: Option<String>,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<CasOutcome<Session>>> {
        Box::pin(async move {
            self.admit("compare_and_set_status").await?;
            self.cas_status_sync(&key, expected, new, result, void_reason, at)
        })
    }

    fn insert_bet(&self, bet: Bet) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            self.admit("insert_bet").await?;
            self.insert_bet_sync(bet)
        })
    }

    fn get_bet(&self, bet_id: BetId) -> BoxFuture<'_, StoreResult<Option<Bet>>> {
        Box::pin(async move {
            self.admit("get_bet").await?;
            Ok(self.bets.get(&bet_id).map(|b| b.value().clone()))
        })
    }

    fn list_session_bets(&self, key: SessionKey) -> BoxFuture<'_, StoreResult<Vec<Bet>>> {
        Box::pin(async move {
            self.admit("list_session_bets").await?;
            let ids = self
                .session_bets
                .get(&key)
                .map(|ids| ids.value().clone())
                .unwrap_or_default();
            Ok(self.collect_bets(&ids))
        })
    }

    fn list_user_bets(
        &self,
        user: UserId,
        page: PageRequest,
    ) -> BoxFuture<'_, StoreResult<Page<Bet>>> {
        Box::pin(async move {
            self.admit("list_user_bets").await?;
            let ids = self
                .user_bets
                .get(&user)
                .map(|ids| ids.value().clone())
                .unwrap_or_default();
            let mut bets = self.collect_bets(&ids);
            // Index is in insertion order; reverse first so equal timestamps
            // still come out newest first after the stable sort.
            bets.reverse();
            bets.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
            Ok(page.paginate(bets))
        })
    }

    fn compare_and_set_outcome(
        &self,
        bet_id: BetId,
        expected: BetOutcome,
        new: BetOutcome,
        payout: Amount,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<CasOutcome<Bet>>> {
        Box::pin(async move {
            self.admit("compare_and_set_outcome").await?;
            self.cas_outcome_sync(&bet_id, expected, new, payout, at)
        })
    }

    fn apply_balance_delta(
        &self,
        user: UserId,
        delta: BalanceDelta,
    ) -> BoxFuture<'_, StoreResult<DeltaOutcome>> {
        Box::pin(async move {
            self.admit("apply_balance_delta").await?;
            Ok(self.apply_delta_sync(user, delta))
        })
    }

    fn get_balance(&self, user: UserId) -> BoxFuture<'_, StoreResult<Balance>> {
        Box::pin(async move {
            self.admit("get_balance").await?;
            Ok(self.balances.get(&user).map(|b| *b.value()).unwrap_or_default())
        })
    }
}
