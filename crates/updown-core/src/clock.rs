//! Session identity and time sources.
//!
//! Maps wall-clock time to the canonical one-minute session window.
//! Every component derives session identity through these functions so
//! that one instant never yields two different session ids.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::session::SessionId;

/// Length of one trading session in seconds.
pub const SESSION_LENGTH_SECS: i64 = 60;

/// Persisted id format. Compatibility surface, e.g. `2507081430`.
const SESSION_ID_FORMAT: &str = "%y%m%d%H%M";

/// Truncate an instant to the start of its minute.
fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    let into_minute = t.timestamp().rem_euclid(SESSION_LENGTH_SECS);
    let nanos = i64::from(t.timestamp_subsec_nanos());
    t - Duration::seconds(into_minute) - Duration::nanoseconds(nanos)
}

/// Get the half-open `[start, end)` session window containing `t`.
#[must_use]
pub fn session_bounds_for(t: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = truncate_to_minute(t);
    (start, start + Duration::seconds(SESSION_LENGTH_SECS))
}

/// Get the session id (`yyMMddHHmm`, UTC) for the window containing `t`.
#[must_use]
pub fn session_id_for(t: DateTime<Utc>) -> SessionId {
    let start = truncate_to_minute(t);
    SessionId::from_string(start.format(SESSION_ID_FORMAT).to_string())
}

/// Trait for obtaining current time, enabling testability.
pub trait Clock: Send + Sync {
    /// Returns the current UTC instant.
    fn now(&self) -> DateTime<Utc>;
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, t: DateTime<Utc>) {
        *self.now.lock() = t;
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
