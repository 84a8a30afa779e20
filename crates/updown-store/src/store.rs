//! Store trait consumed by the engine.
//!
//! Provides a trait-based abstraction over the document store so the
//! engine can be driven against the in-memory implementation in tests and
//! a real backend in production. Methods return boxed futures to keep the
//! trait dyn-compatible (`Arc<dyn SessionStore>`).

use std::pin::Pin;

use chrono::{DateTime, Utc};

use updown_core::{
    Amount, Balance, BalanceDelta, Bet, BetId, BetOutcome, Direction, Page, PageRequest, Session,
    SessionKey, SessionStatus, UserId,
};

use crate::error::StoreResult;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Result of `create_session_if_absent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// This call inserted the session.
    Created(Session),
    /// Another writer got there first; carries the winner's session.
    Existing(Session),
}

impl CreateOutcome {
    pub fn session(&self) -> &Session {
        match self {
            Self::Created(s) | Self::Existing(s) => s,
        }
    }

    pub fn into_session(self) -> Session {
        match self {
            Self::Created(s) | Self::Existing(s) => s,
        }
    }

    #[must_use]
    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Result of a compare-and-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome<T> {
    /// Expected value matched; carries the updated record.
    Applied(T),
    /// Expected value did not match; carries the current record.
    Conflict(T),
}

impl<T> CasOutcome<T> {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Applied(t) | Self::Conflict(t) => t,
        }
    }
}

/// Result of a conditional balance increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// Delta applied; carries the new balance.
    Applied(Balance),
    /// A component would have gone negative; carries the unchanged balance.
    Rejected(Balance),
}

/// Persistence operations required by the engine.
///
/// Implementations must make every single method atomic with respect to
/// concurrent calls on the same record.
pub trait SessionStore: Send + Sync {
    /// Insert `session` unless `(asset, id)` already exists.
    fn create_session_if_absent(
        &self,
        session: Session,
    ) -> BoxFuture<'_, StoreResult<CreateOutcome>>;

    /// Find a session by key.
    fn get_session(&self, key: SessionKey) -> BoxFuture<'_, StoreResult<Option<Session>>>;

    /// All sessions currently in `status`, any asset.
    fn list_sessions_with_status(
        &self,
        status: SessionStatus,
    ) -> BoxFuture<'_, StoreResult<Vec<Session>>>;

    /// Sessions of one asset, newest first.
    fn list_sessions(
        &self,
        asset: String,
        page: PageRequest,
    ) -> BoxFuture<'_, StoreResult<Page<Session>>>;

    /// Move a session from `expected` to `new`.
    ///
    /// `result` and `void_reason` are written only when applied.
    /// Fails `NotFound` for an unknown key.
    fn compare_and_set_status(
        &self,
        key: SessionKey,
        expected: SessionStatus,
        new: SessionStatus,
        result: Option<Direction>,
        void_reason: Option<String>,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<CasOutcome<Session>>>;

    /// Insert a new bet. Fails `Duplicate` if the id exists.
    fn insert_bet(&self, bet: Bet) -> BoxFuture<'_, StoreResult<()>>;

    /// Find a bet by id.
    fn get_bet(&self, bet_id: BetId) -> BoxFuture<'_, StoreResult<Option<Bet>>>;

    /// All bets of one session, in placement order.
    fn list_session_bets(&self, key: SessionKey) -> BoxFuture<'_, StoreResult<Vec<Bet>>>;

    /// Bets of one user, newest first.
    fn list_user_bets(
        &self,
        user: UserId,
        page: PageRequest,
    ) -> BoxFuture<'_, StoreResult<Page<Bet>>>;

    /// Move a bet from `expected` to `new`, recording `payout`.
    fn compare_and_set_outcome(
        &self,
        bet_id: BetId,
        expected: BetOutcome,
        new: BetOutcome,
        payout: Amount,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<CasOutcome<Bet>>>;

    /// Apply `delta` only if neither component would go negative.
    fn apply_balance_delta(
        &self,
        user: UserId,
        delta: BalanceDelta,
    ) -> BoxFuture<'_, StoreResult<DeltaOutcome>>;

    /// Current balance (zero for unknown users).
    fn get_balance(&self, user: UserId) -> BoxFuture<'_, StoreResult<Balance>>;
}
