//! Core domain types for the up/down session settlement engine.
//!
//! This crate provides the records and pure functions shared by every
//! other crate in the workspace:
//! - `SessionKey`, `SessionId`: Session identity derived from wall-clock time
//! - `Session`, `SessionStatus`, `Direction`: One-minute trading windows
//! - `Bet`, `BetId`, `BetOutcome`, `UserId`: Directional stakes
//! - `Balance`, `BalanceDelta`: Available/frozen ledger partition
//! - `Clock`: Injectable time source

pub mod balance;
pub mod bet;
pub mod clock;
pub mod error;
pub mod page;
pub mod session;

pub use balance::{Amount, Balance, BalanceDelta};
pub use bet::{Bet, BetId, BetOutcome, UserId};
pub use clock::{
    session_bounds_for, session_id_for, Clock, ManualClock, SystemClock, SESSION_LENGTH_SECS,
};
pub use error::{CoreError, Result};
pub use page::{Page, PageRequest};
pub use session::{Direction, Session, SessionId, SessionKey, SessionStatus};
