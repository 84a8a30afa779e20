//! Prometheus metrics and structured logging for the settlement engine.
//!
//! - Prometheus metrics for bets, session transitions, payouts and faults
//! - Structured JSON logging with tracing
//! - Periodic settlement summary output

pub mod error;
pub mod logging;
pub mod metrics;
pub mod stats;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use stats::{AssetStats, StatsReporter};
