//! Trading session types.
//!
//! A session is one fixed one-minute window on a single asset with a
//! single binary outcome. Identity is `(asset, session_id)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::clock::{session_bounds_for, session_id_for};
use crate::error::CoreError;

/// Minute-granularity session identifier (`yyMMddHHmm`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create from an existing string (for persisted ids).
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Parse and validate a persisted id.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s.len() != 10 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidSessionId(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique session key combining asset and session id.
///
/// Format: `{asset}@{id}` (e.g., "XAU/USD@2507081430").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub asset: String,
    pub id: SessionId,
}

impl SessionKey {
    pub fn new(asset: impl Into<String>, id: SessionId) -> Self {
        Self {
            asset: asset.into(),
            id,
        }
    }

    /// Key of the session whose window contains `t`.
    pub fn for_instant(asset: impl Into<String>, t: DateTime<Utc>) -> Self {
        Self::new(asset, session_id_for(t))
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.asset, self.id)
    }
}

/// Bet direction and session result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Returns the opposite direction.
    pub fn opposite(&self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
        }
    }
}

impl FromStr for Direction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UP" => Ok(Self::Up),
            "DOWN" => Ok(Self::Down),
            _ => Err(CoreError::InvalidDirection(s.to_string())),
        }
    }
}

/// Session lifecycle state.
///
/// `Open -> Locked -> {Settled | Void}`; `Open -> Void` is also allowed
/// for administrative cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    /// Accepting bets.
    Open,
    /// Boundary passed, awaiting result.
    Locked,
    /// Result applied, payouts processed.
    Settled,
    /// Cancelled, all bets refunded.
    Void,
}

impl SessionStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Void)
    }

    /// Whether `self -> next` is an edge of the lifecycle.
    #[must_use]
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::Locked)
                | (Self::Open, Self::Void)
                | (Self::Locked, Self::Settled)
                | (Self::Locked, Self::Void)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Locked => "locked",
            Self::Settled => "settled",
            Self::Void => "void",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().to_ascii_uppercase())
    }
}

/// A one-minute trading session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub key: SessionKey,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SessionStatus,
    /// Set exactly once, on the transition to `Settled`.
    pub result: Option<Direction>,
    pub created_at: DateTime<Utc>,
    /// Time of the last status transition.
    pub updated_at: DateTime<Utc>,
    /// Reason recorded when the session was voided.
    pub void_reason: Option<String>,
}

impl Session {
    /// Create an `Open` session for the window containing `now`.
    pub fn open_at(asset: impl Into<String>, now: DateTime<Utc>) -> Self {
        let (start_time, end_time) = session_bounds_for(now);
        Self {
            key: SessionKey::for_instant(asset, now),
            start_time,
            end_time,
            status: SessionStatus::Open,
            result: None,
            created_at: now,
            updated_at: now,
            void_reason: None,
        }
    }

    pub fn asset(&self) -> &str {
        &self.key.asset
    }

    /// Whether `t` falls inside `[start_time, end_time)`.
    #[must_use]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start_time <= t && t < self.end_time
    }

    /// Whether a bet placed at `t` may be accepted.
    ///
    /// Checks the clock as well as the status: the lock tick may lag the
    /// boundary.
    #[must_use]
    pub fn accepts_bets_at(&self, t: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Open && self.contains(t)
    }

    /// Whether the window has closed at `now`.
    #[must_use]
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.end_time <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 8, h, m, s).unwrap()
    }

    #[test]
    fn test_open_at_uses_minute_window() {
        let session = Session::open_at("XAU/USD", at(10, 15, 10));
        assert_eq!(session.key.id.as_str(), "2507081015");
        assert_eq!(session.start_time, at(10, 15, 0));
        assert_eq!(session.end_time, at(10, 16, 0));
        assert_eq!(session.status, SessionStatus::Open);
        assert!(session.result.is_none());
    }

    #[test]
    fn test_accepts_bets_boundary_exclusive() {
        let session = Session::open_at("XAU/USD", at(10, 15, 0));
        assert!(session.accepts_bets_at(at(10, 15, 0)));
        assert!(session.accepts_bets_at(at(10, 16, 0) - Duration::milliseconds(1)));
        assert!(!session.accepts_bets_at(at(10, 16, 0)));
        assert!(!session.accepts_bets_at(at(10, 14, 59)));
    }

    #[test]
    fn test_locked_session_rejects_bets_inside_window() {
        let mut session = Session::open_at("XAU/USD", at(10, 15, 0));
        session.status = SessionStatus::Locked;
        assert!(!session.accepts_bets_at(at(10, 15, 30)));
    }

    #[test]
    fn test_status_transitions() {
        use SessionStatus::*;
        assert!(Open.can_transition_to(Locked));
        assert!(Open.can_transition_to(Void));
        assert!(Locked.can_transition_to(Settled));
        assert!(Locked.can_transition_to(Void));

        assert!(!Open.can_transition_to(Settled));
        assert!(!Locked.can_transition_to(Open));
        assert!(!Settled.can_transition_to(Void));
        assert!(!Void.can_transition_to(Settled));
        assert!(Settled.is_terminal() && Void.is_terminal());
    }

    #[test]
    fn test_direction_parse_and_display() {
        assert_eq!("up".parse::<Direction>().unwrap(), Direction::Up);
        assert_eq!("DOWN".parse::<Direction>().unwrap(), Direction::Down);
        assert!("sideways".parse::<Direction>().is_err());
        assert_eq!(Direction::Up.opposite().to_string(), "DOWN");
    }

    #[test]
    fn test_session_id_parse() {
        assert!(SessionId::parse("2507081430").is_ok());
        assert!(SessionId::parse("25070814").is_err());
        assert!(SessionId::parse("25070814ab").is_err());
    }

    #[test]
    fn test_session_serialization() {
        let session = Session::open_at("XAU/USD", at(14, 30, 0));
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["key"]["id"], "2507081430");
        assert_eq!(json["status"], "OPEN");
    }
}
