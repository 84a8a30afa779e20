//! Engine configuration.

use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use updown_core::Amount;

use crate::error::{EngineError, EngineResult};

/// Largest accepted `payout_multiplier`.
pub const MAX_PAYOUT_MULTIPLIER: Decimal = Decimal::ONE_HUNDRED;

/// Largest accepted `auto_void_after_secs` (7 days).
pub const MAX_AUTO_VOID_AFTER_SECS: u64 = 7 * 24 * 3_600;

/// Settlement engine configuration.
///
/// Trading rules (`payout_multiplier`, `min_trade`, `max_trade`) are read
/// when a bet is placed; the multiplier is stored on the bet so later
/// changes never affect pending bets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Traded instrument.
    #[serde(default = "default_asset")]
    pub asset: String,
    /// Gross payout per unit staked on a win (stake included). Default: 1.8.
    #[serde(default = "default_payout_multiplier")]
    pub payout_multiplier: Decimal,
    /// Minimum stake (minor units).
    #[serde(default = "default_min_trade")]
    pub min_trade: Amount,
    /// Maximum stake (minor units).
    #[serde(default = "default_max_trade")]
    pub max_trade: Amount,
    /// Reject a second bet from the same user in one session.
    #[serde(default)]
    pub one_bet_per_session: bool,
    /// Ticker period (ms). Default: 1,000.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Upper bound on a single store call (ms). Default: 2,000.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Void LOCKED sessions this long after their boundary.
    /// `None` leaves them LOCKED until an operator acts.
    #[serde(default)]
    pub auto_void_after_secs: Option<u64>,
    /// Notifier buffer per subscriber before lagging events are dropped.
    #[serde(default = "default_notifier_capacity")]
    pub notifier_capacity: usize,
}

fn default_asset() -> String {
    "XAU/USD".to_string()
}

fn default_payout_multiplier() -> Decimal {
    Decimal::new(18, 1)
}

fn default_min_trade() -> Amount {
    1_000
}

fn default_max_trade() -> Amount {
    100_000_000
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_store_timeout_ms() -> u64 {
    2_000
}

fn default_notifier_capacity() -> usize {
    1_024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            asset: default_asset(),
            payout_multiplier: default_payout_multiplier(),
            min_trade: default_min_trade(),
            max_trade: default_max_trade(),
            one_bet_per_session: false,
            tick_interval_ms: default_tick_interval_ms(),
            store_timeout_ms: default_store_timeout_ms(),
            auto_void_after_secs: None,
            notifier_capacity: default_notifier_capacity(),
        }
    }
}

impl EngineConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.asset.trim().is_empty() {
            return Err(EngineError::InvalidConfig("asset must not be empty".to_string()));
        }
        if self.payout_multiplier < Decimal::ONE || self.payout_multiplier > MAX_PAYOUT_MULTIPLIER
        {
            return Err(EngineError::InvalidConfig(format!(
                "payout_multiplier must be in 1..={MAX_PAYOUT_MULTIPLIER}, got {}",
                self.payout_multiplier
            )));
        }
        if self.min_trade == 0 {
            return Err(EngineError::InvalidConfig("min_trade must be positive".to_string()));
        }
        if self.min_trade > self.max_trade {
            return Err(EngineError::InvalidConfig(format!(
                "min_trade {} exceeds max_trade {}",
                self.min_trade, self.max_trade
            )));
        }
        let top_payout = Decimal::from(self.max_trade)
            .checked_mul(self.payout_multiplier)
            .and_then(|p| p.floor().to_u64());
        if top_payout.is_none() {
            return Err(EngineError::InvalidConfig(format!(
                "max_trade {} at multiplier {} overflows the payout range",
                self.max_trade, self.payout_multiplier
            )));
        }
        if let Some(secs) = self.auto_void_after_secs {
            if secs > MAX_AUTO_VOID_AFTER_SECS {
                return Err(EngineError::InvalidConfig(format!(
                    "auto_void_after_secs must be <= {MAX_AUTO_VOID_AFTER_SECS}, got {secs}"
                )));
            }
        }
        if self.tick_interval_ms == 0 || self.store_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "tick_interval_ms and store_timeout_ms must be positive".to_string(),
            ));
        }
        if self.notifier_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "notifier_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `amount` is an acceptable stake.
    #[must_use]
    pub fn amount_in_bounds(&self, amount: Amount) -> bool {
        amount > 0 && (self.min_trade..=self.max_trade).contains(&amount)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn auto_void_after(&self) -> Option<chrono::Duration> {
        self.auto_void_after_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(chrono::Duration::try_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.payout_multiplier, dec!(1.8));
        assert!(config.auto_void_after().is_none());
    }

    #[test]
    fn test_amount_bounds() {
        let config = EngineConfig {
            min_trade: 100,
            max_trade: 1_000,
            ..Default::default()
        };
        assert!(!config.amount_in_bounds(0));
        assert!(!config.amount_in_bounds(99));
        assert!(config.amount_in_bounds(100));
        assert!(config.amount_in_bounds(1_000));
        assert!(!config.amount_in_bounds(1_001));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_multiplier = EngineConfig {
            payout_multiplier: dec!(0.9),
            ..Default::default()
        };
        assert!(bad_multiplier.validate().is_err());

        let inverted = EngineConfig {
            min_trade: 10,
            max_trade: 5,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let zero_min = EngineConfig {
            min_trade: 0,
            ..Default::default()
        };
        assert!(zero_min.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overflowing_limits() {
        let huge_multiplier = EngineConfig {
            payout_multiplier: dec!(10_000_000_000_000),
            ..Default::default()
        };
        assert!(matches!(
            huge_multiplier.validate(),
            Err(EngineError::InvalidConfig(_))
        ));

        let huge_stake = EngineConfig {
            max_trade: u64::MAX,
            ..Default::default()
        };
        assert!(huge_stake.validate().is_err());

        let huge_grace = EngineConfig {
            auto_void_after_secs: Some(10_000_000_000_000),
            ..Default::default()
        };
        assert!(huge_grace.validate().is_err());

        let week = EngineConfig {
            payout_multiplier: MAX_PAYOUT_MULTIPLIER,
            auto_void_after_secs: Some(MAX_AUTO_VOID_AFTER_SECS),
            ..Default::default()
        };
        assert!(week.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            asset = "BTC/USD"
            payout_multiplier = "1.9"
            auto_void_after_secs = 300
            "#,
        )
        .unwrap();
        assert_eq!(config.asset, "BTC/USD");
        assert_eq!(config.payout_multiplier, dec!(1.9));
        assert_eq!(config.min_trade, 1_000);
        assert_eq!(config.auto_void_after(), Some(chrono::Duration::seconds(300)));
    }
}
