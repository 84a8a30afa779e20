//! Trading session and settlement engine.
//!
//! One-minute sessions are minted on wall-clock boundaries, accept
//! directional bets while OPEN, lock at their boundary, and are settled
//! (or voided) exactly once. Every balance change goes through a single
//! conditional delta at the store, and every status or outcome change
//! through a compare-and-set, so concurrent callers need no locks.
//!
//! # Components
//!
//! - [`Ledger`]: available/frozen balances, halting users on drift
//! - [`BetBook`]: bet placement and history
//! - [`SessionManager`]: lifecycle, settlement and void fan-out
//! - [`Notifier`]: broadcast of [`EngineEvent`]s
//! - [`Engine`]: facade wiring the above over one [`updown_store::SessionStore`]
//! - [`run_ticker`]: periodic driver of [`Engine::tick`]

pub mod bet_book;
mod call;
pub mod config;
pub mod engine;
pub mod error;
pub mod halt;
pub mod ledger;
pub mod notifier;
pub mod report;
pub mod session_manager;
pub mod ticker;

pub use bet_book::BetBook;
pub use config::EngineConfig;
pub use engine::{Engine, TickReport};
pub use error::{EngineError, EngineResult};
pub use halt::AccountHalts;
pub use ledger::Ledger;
pub use notifier::{EngineEvent, Notifier};
pub use report::{BetFailure, ResumeReport, SettlementReport, VoidReport};
pub use session_manager::{SessionManager, AUTO_VOID_REASON};
pub use ticker::run_ticker;
