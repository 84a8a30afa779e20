//! Engine error types.

use thiserror::Error;

use updown_core::{Amount, CoreError, SessionKey, UserId};
use updown_store::StoreError;

/// Engine errors.
///
/// Grouped by who handles them:
/// - user-facing: `InvalidAmount`, `SessionNotOpen`, `SessionNotFound`,
///   `InsufficientFunds`, `DuplicateBet`, `AccountHalted`, `InvalidRequest`
/// - admin races: `AlreadySettled`, `AlreadyVoided`, `SessionNotLocked`,
///   `NotSettled`
/// - fatal: `InvariantViolation`
/// - transient: `StoreUnavailable`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Invalid amount {amount}: must be within [{min}, {max}]")]
    InvalidAmount {
        amount: Amount,
        min: Amount,
        max: Amount,
    },

    #[error("Session not open for bets: {0}")]
    SessionNotOpen(SessionKey),

    #[error("Session not found: {0}")]
    SessionNotFound(SessionKey),

    #[error("Session not locked yet: {0}")]
    SessionNotLocked(SessionKey),

    #[error("Session has no settlement to resume: {0}")]
    NotSettled(SessionKey),

    #[error("Insufficient funds for {user}: requested {requested}, available {available}")]
    InsufficientFunds {
        user: UserId,
        requested: Amount,
        available: Amount,
    },

    #[error("User {user} already holds a bet in session {session}")]
    DuplicateBet { user: UserId, session: SessionKey },

    #[error("Session already settled: {0}")]
    AlreadySettled(SessionKey),

    #[error("Session already voided: {0}")]
    AlreadyVoided(SessionKey),

    #[error("Ledger invariant violated for {user}: {detail}")]
    InvariantViolation { user: UserId, detail: String },

    #[error("Account halted: {user} ({reason})")]
    AccountHalted { user: UserId, reason: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl EngineError {
    /// Errors returned to the end user for display, never logged as failures.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount { .. }
                | Self::SessionNotOpen(_)
                | Self::SessionNotFound(_)
                | Self::InsufficientFunds { .. }
                | Self::DuplicateBet { .. }
                | Self::AccountHalted { .. }
                | Self::InvalidRequest(_)
        )
    }

    /// Errors the caller may retry with backoff.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Errors that require operator intervention.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }

    /// Another writer already moved the session to a terminal state.
    #[must_use]
    pub fn is_already_terminal(&self) -> bool {
        matches!(self, Self::AlreadySettled(_) | Self::AlreadyVoided(_))
    }

    /// Short label for metrics.
    pub fn reason_label(&self) -> &'static str {
        match self {
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::SessionNotOpen(_) => "session_not_open",
            Self::SessionNotFound(_) => "session_not_found",
            Self::SessionNotLocked(_) => "session_not_locked",
            Self::NotSettled(_) => "not_settled",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::DuplicateBet { .. } => "duplicate_bet",
            Self::AlreadySettled(_) => "already_settled",
            Self::AlreadyVoided(_) => "already_voided",
            Self::InvariantViolation { .. } => "invariant_violation",
            Self::AccountHalted { .. } => "account_halted",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Store(_) => "store_error",
            Self::Cancelled => "cancelled",
            Self::InvalidConfig(_) => "invalid_config",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => Self::StoreUnavailable(msg),
            other => Self::Store(other),
        }
    }
}

impl From<CoreError> for EngineError {
    fn from(e: CoreError) -> Self {
        Self::InvalidRequest(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
