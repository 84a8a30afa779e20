//! Engine event fan-out.
//!
//! Events are published after the state change they describe has been
//! written. Delivery is best effort: a subscriber that falls behind the
//! channel capacity sees `RecvError::Lagged` and misses events, and
//! publishing with no subscribers is not an error.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

use updown_core::{Bet, Session, UserId};

use crate::report::{SettlementReport, VoidReport};

/// State change observed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    SessionOpened { session: Session },
    SessionLocked { session: Session },
    SessionSettled { report: SettlementReport },
    SessionVoided { report: VoidReport },
    BetAccepted { bet: Bet },
    AccountHalted { user: UserId, reason: String },
}

impl EngineEvent {
    /// Event name as it appears in the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionOpened { .. } => "session_opened",
            Self::SessionLocked { .. } => "session_locked",
            Self::SessionSettled { .. } => "session_settled",
            Self::SessionVoided { .. } => "session_voided",
            Self::BetAccepted { .. } => "bet_accepted",
            Self::AccountHalted { .. } => "account_halted",
        }
    }
}

/// Broadcast publisher for [`EngineEvent`]s.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<EngineEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish `event` to current subscribers.
    pub fn publish(&self, event: EngineEvent) {
        let kind = event.kind();
        match self.tx.send(event) {
            Ok(receivers) => trace!(kind, receivers, "Event published"),
            Err(_) => trace!(kind, "No event subscribers"),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
