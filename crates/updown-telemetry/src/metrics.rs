//! Prometheus metrics for the settlement engine.
//!
//! Covers:
//! - Bet placement (accepted / rejected by reason)
//! - Session lifecycle transitions
//! - Settlement fan-out (outcomes, stake, payout, duration)
//! - Ticker and store faults
//! - Ledger invariant violations and halted accounts
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration
//! failure means duplicate metric names, which is a programming error that
//! should surface on first use rather than silently drop data.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, register_int_gauge,
    register_int_gauge_vec, CounterVec, HistogramVec, IntCounter, IntGauge, IntGaugeVec,
};

/// Total bets accepted.
pub static BETS_ACCEPTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_bets_accepted_total",
        "Total bets accepted",
        &["asset", "direction"]
    )
    .unwrap()
});

/// Total bets rejected.
/// Labels: reason (invalid_amount/session_not_open/insufficient_funds/...)
pub static BETS_REJECTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_bets_rejected_total",
        "Total bets rejected by reason",
        &["reason"]
    )
    .unwrap()
});

/// Total stake frozen by accepted bets (minor units).
pub static STAKE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_stake_total",
        "Total stake accepted in minor units",
        &["asset"]
    )
    .unwrap()
});

/// Session status transitions.
pub static SESSION_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_session_transitions_total",
        "Session status transitions",
        &["asset", "status"]
    )
    .unwrap()
});

/// Currently open sessions per asset.
pub static OPEN_SESSIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "updown_open_sessions",
        "Sessions currently accepting bets",
        &["asset"]
    )
    .unwrap()
});

/// Bets reaching a terminal outcome.
pub static BETS_SETTLED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_bets_settled_total",
        "Bets reaching a terminal outcome",
        &["asset", "outcome"]
    )
    .unwrap()
});

/// Gross payouts credited to winners (minor units, stake included).
pub static PAYOUT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_payout_total",
        "Gross payouts credited in minor units",
        &["asset"]
    )
    .unwrap()
});

/// Stakes refunded by voided bets (minor units).
pub static REFUND_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_refund_total",
        "Stakes refunded by voided bets in minor units",
        &["asset"]
    )
    .unwrap()
});

/// Settlement fan-out duration.
pub static SETTLEMENT_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "updown_settlement_duration_ms",
        "Wall time of one settle/void fan-out in milliseconds",
        &["asset", "kind"],
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Tick stages that failed and will be retried next tick.
pub static TICK_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_tick_failures_total",
        "Ticker stage failures",
        &["stage"]
    )
    .unwrap()
});

/// Store calls that exceeded the configured timeout.
pub static STORE_TIMEOUTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "updown_store_timeouts_total",
        "Store operations that timed out",
        &["op"]
    )
    .unwrap()
});

/// Ledger bookkeeping drift detections.
pub static INVARIANT_VIOLATIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "updown_invariant_violations_total",
        "Ledger invariant violations (frozen < release amount)"
    )
    .unwrap()
});

/// Accounts currently halted pending operator review.
pub static HALTED_ACCOUNTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "updown_halted_accounts",
        "Accounts halted after an invariant violation"
    )
    .unwrap()
});

/// Metrics helper.
pub struct Metrics;

impl Metrics {
    /// Record an accepted bet.
    pub fn bet_accepted(asset: &str, direction: &str, amount: u64) {
        BETS_ACCEPTED_TOTAL
            .with_label_values(&[asset, direction])
            .inc();
        STAKE_TOTAL.with_label_values(&[asset]).inc_by(amount as f64);
    }

    /// Record a rejected bet.
    pub fn bet_rejected(reason: &str) {
        BETS_REJECTED_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record a session status transition.
    pub fn session_transition(asset: &str, status: &str) {
        SESSION_TRANSITIONS_TOTAL
            .with_label_values(&[asset, status])
            .inc();
        if status == "open" {
            OPEN_SESSIONS.with_label_values(&[asset]).inc();
        }
    }

    /// Record a session leaving `open`.
    pub fn session_closed_for_bets(asset: &str) {
        OPEN_SESSIONS.with_label_values(&[asset]).dec();
    }

    /// Record a bet reaching a terminal outcome.
    pub fn bet_settled(asset: &str, outcome: &str) {
        BETS_SETTLED_TOTAL
            .with_label_values(&[asset, outcome])
            .inc();
    }

    /// Record a payout credited to a winner.
    pub fn payout(asset: &str, amount: u64) {
        PAYOUT_TOTAL.with_label_values(&[asset]).inc_by(amount as f64);
    }

    /// Record a stake refunded by a void.
    pub fn refund(asset: &str, amount: u64) {
        REFUND_TOTAL.with_label_values(&[asset]).inc_by(amount as f64);
    }

    /// Record fan-out duration. `kind` is `settle`, `void` or `resume`.
    pub fn settlement_duration(asset: &str, kind: &str, duration_ms: f64) {
        SETTLEMENT_DURATION_MS
            .with_label_values(&[asset, kind])
            .observe(duration_ms);
    }

    /// Record a failed ticker stage.
    pub fn tick_failure(stage: &str) {
        TICK_FAILURES_TOTAL.with_label_values(&[stage]).inc();
    }

    /// Record a store timeout.
    pub fn store_timeout(op: &str) {
        STORE_TIMEOUTS_TOTAL.with_label_values(&[op]).inc();
    }

    /// Record an invariant violation.
    pub fn invariant_violation() {
        INVARIANT_VIOLATIONS_TOTAL.inc();
    }

    /// Set the number of halted accounts.
    pub fn halted_accounts_set(count: i64) {
        HALTED_ACCOUNTS.set(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bet_accepted_increments_stake() {
        let before = STAKE_TOTAL.with_label_values(&["TEST/ACC"]).get();
        Metrics::bet_accepted("TEST/ACC", "UP", 250);
        let after = STAKE_TOTAL.with_label_values(&["TEST/ACC"]).get();
        assert_eq!(after - before, 250.0);
    }

    #[test]
    fn test_open_sessions_gauge() {
        Metrics::session_transition("TEST/GAUGE", "open");
        Metrics::session_transition("TEST/GAUGE", "open");
        Metrics::session_closed_for_bets("TEST/GAUGE");
        assert_eq!(OPEN_SESSIONS.with_label_values(&["TEST/GAUGE"]).get(), 1);
    }
}
