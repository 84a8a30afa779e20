//! Persistence for the up/down settlement engine.
//!
//! The engine treats the store as a transactional key/document store and
//! relies only on these primitives:
//! - create-if-absent on `(asset, session_id)`
//! - compare-and-set on session status and bet outcome
//! - conditional atomic increment of user balances
//! - simple find/list/paginate
//!
//! [`MemoryStore`] is the in-process implementation used by the daemon and
//! by tests.

pub mod error;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::{Fault, MemoryStore};
pub use store::{BoxFuture, CasOutcome, CreateOutcome, DeltaOutcome, SessionStore};
