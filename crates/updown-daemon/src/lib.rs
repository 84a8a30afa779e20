//! Settlement engine daemon.
//!
//! Hosts one [`updown_engine::Engine`] and drives it:
//! - ticker opening, locking and auto-voiding sessions
//! - event journal (JSON Lines, rotated daily)
//! - periodic settlement summaries in the log

pub mod app;
pub mod config;
pub mod error;
pub mod journal;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use journal::{EventJournal, JournalRecord};
