//! Periodic settlement statistics output.
//!
//! Reads the process-wide counters and logs a per-asset summary:
//! - bets accepted (up / down) and total stake
//! - sessions settled and voided
//! - gross payouts, refunds and house net

use chrono::{DateTime, Utc};
use tracing::info;

use crate::metrics::{
    BETS_ACCEPTED_TOTAL, PAYOUT_TOTAL, REFUND_TOTAL, SESSION_TRANSITIONS_TOTAL, STAKE_TOTAL,
};

/// Summary statistics for one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetStats {
    pub asset: String,
    pub bets_up: u64,
    pub bets_down: u64,
    pub stake_total: u64,
    pub sessions_settled: u64,
    pub sessions_voided: u64,
    pub payout_total: u64,
    pub refund_total: u64,
}

impl AssetStats {
    /// Stake kept by the house minus profit paid out.
    #[must_use]
    pub fn house_net(&self) -> i128 {
        i128::from(self.stake_total) - i128::from(self.payout_total) - i128::from(self.refund_total)
    }
}

/// Settlement statistics reporter.
pub struct StatsReporter {
    assets: Vec<String>,
    start_time: DateTime<Utc>,
}

impl StatsReporter {
    /// Create a new reporter for the given assets.
    pub fn new(assets: Vec<String>) -> Self {
        Self {
            assets,
            start_time: Utc::now(),
        }
    }

    /// Get current statistics for all assets.
    pub fn get_stats(&self) -> Vec<AssetStats> {
        self.assets
            .iter()
            .map(|asset| self.get_asset_stats(asset))
            .collect()
    }

    fn get_asset_stats(&self, asset: &str) -> AssetStats {
        AssetStats {
            asset: asset.to_string(),
            bets_up: self.get_counter_value(&BETS_ACCEPTED_TOTAL, &[asset, "UP"]),
            bets_down: self.get_counter_value(&BETS_ACCEPTED_TOTAL, &[asset, "DOWN"]),
            stake_total: self.get_counter_value(&STAKE_TOTAL, &[asset]),
            sessions_settled: self
                .get_counter_value(&SESSION_TRANSITIONS_TOTAL, &[asset, "settled"]),
            sessions_voided: self.get_counter_value(&SESSION_TRANSITIONS_TOTAL, &[asset, "void"]),
            payout_total: self.get_counter_value(&PAYOUT_TOTAL, &[asset]),
            refund_total: self.get_counter_value(&REFUND_TOTAL, &[asset]),
        }
    }

    fn get_counter_value(&self, counter: &prometheus::CounterVec, labels: &[&str]) -> u64 {
        counter.with_label_values(labels).get() as u64
    }

    /// Output statistics to logs.
    pub fn output_summary(&self) {
        let stats = self.get_stats();
        let duration = Utc::now() - self.start_time;

        info!("========== Settlement Summary ==========");
        info!(
            "Period: {} ({} hours {} minutes)",
            self.start_time.format("%Y-%m-%d %H:%M:%S UTC"),
            duration.num_hours(),
            duration.num_minutes() % 60
        );

        for s in &stats {
            info!("--- {} ---", s.asset);
            info!(
                "  Bets: {} (up: {}, down: {}), stake: {}",
                s.bets_up + s.bets_down,
                s.bets_up,
                s.bets_down,
                s.stake_total
            );
            info!(
                "  Sessions settled: {}, voided: {}",
                s.sessions_settled, s.sessions_voided
            );
            info!(
                "  Payout: {}, refunds: {}, house net: {}",
                s.payout_total,
                s.refund_total,
                s.house_net()
            );
        }

        info!("=========================================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;

    #[test]
    fn test_stats_reflect_counters() {
        let asset = "TEST/STATS";
        Metrics::bet_accepted(asset, "UP", 20_000);
        Metrics::bet_accepted(asset, "DOWN", 10_000);
        Metrics::session_transition(asset, "settled");
        Metrics::payout(asset, 36_000);

        let reporter = StatsReporter::new(vec![asset.to_string()]);
        let stats = reporter.get_stats();
        assert_eq!(stats.len(), 1);

        let s = &stats[0];
        assert_eq!(s.bets_up, 1);
        assert_eq!(s.bets_down, 1);
        assert_eq!(s.stake_total, 30_000);
        assert_eq!(s.sessions_settled, 1);
        assert_eq!(s.house_net(), -6_000);
    }
}
