//! Main application orchestration.
//!
//! Coordinates:
//! - the engine ticker (session open/lock/auto-void)
//! - the event journal
//! - periodic settlement summaries

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use updown_core::{Clock, SystemClock};
use updown_engine::{run_ticker, Engine};
use updown_store::{MemoryStore, SessionStore};
use updown_telemetry::StatsReporter;

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::journal::{run_journal, EventJournal};

/// Main application.
pub struct Application {
    config: AppConfig,
    engine: Arc<Engine>,
    clock: Arc<dyn Clock>,
    stats: StatsReporter,
    cancel: CancellationToken,
}

impl Application {
    /// Create an application over the in-process store.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        Self::with_store(config, Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    /// Create an application over an explicit store and clock.
    pub fn with_store(
        config: AppConfig,
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        let engine = Arc::new(Engine::new(config.engine.clone(), store)?);
        let stats = StatsReporter::new(vec![config.engine.asset.clone()]);
        Ok(Self {
            config,
            engine,
            clock,
            stats,
            cancel: CancellationToken::new(),
        })
    }

    pub fn engine(&self) -> Arc<Engine> {
        Arc::clone(&self.engine)
    }

    /// Token that stops the application when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until ctrl-c or the shutdown token fires.
    pub async fn run(self) -> AppResult<()> {
        info!(
            asset = %self.config.engine.asset,
            multiplier = %self.config.engine.payout_multiplier,
            min_trade = self.config.engine.min_trade,
            max_trade = self.config.engine.max_trade,
            auto_void_after_secs = ?self.config.engine.auto_void_after_secs,
            "Starting settlement engine"
        );

        let journal_handle = self.spawn_journal()?;
        let ticker_handle = tokio::spawn(run_ticker(
            Arc::clone(&self.engine),
            Arc::clone(&self.clock),
            self.cancel.clone(),
        ));

        let mut stats_interval =
            tokio::time::interval(Duration::from_secs(self.config.telemetry.stats_interval_secs));
        // The first tick completes immediately
        stats_interval.tick().await;

        loop {
            tokio::select! {
                _ = stats_interval.tick() => {
                    self.stats.output_summary();
                    let halted = self.engine.halted_accounts();
                    if !halted.is_empty() {
                        warn!(
                            count = halted.len(),
                            users = ?halted,
                            "Accounts halted, awaiting operator"
                        );
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = self.cancel.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.cancel.cancel();
        if let Err(e) = ticker_handle.await {
            warn!(?e, "Ticker task ended abnormally");
        }
        if let Some(handle) = journal_handle {
            if let Err(e) = handle.await {
                warn!(?e, "Journal task ended abnormally");
            }
        }

        info!("Final statistics summary:");
        self.stats.output_summary();
        Ok(())
    }

    fn spawn_journal(&self) -> AppResult<Option<JoinHandle<()>>> {
        if !self.config.journal.enabled {
            info!("Event journal disabled");
            return Ok(None);
        }
        let journal = EventJournal::new(
            &self.config.journal.data_dir,
            self.config.journal.buffer_size,
        )?;
        info!(data_dir = %self.config.journal.data_dir, "Event journal enabled");
        Ok(Some(tokio::spawn(run_journal(
            journal,
            self.engine.subscribe(),
            self.cancel.clone(),
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;
    use updown_core::{Direction, ManualClock, UserId};

    use crate::config::JournalConfig;

    #[tokio::test]
    async fn test_run_journals_events_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig {
            journal: JournalConfig {
                enabled: true,
                data_dir: dir.path().to_str().unwrap().to_string(),
                buffer_size: 100,
            },
            ..Default::default()
        };
        config.engine.tick_interval_ms = 10;

        let start = Utc.with_ymd_and_hms(2025, 7, 8, 10, 15, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let app = Application::with_store(config, Arc::new(MemoryStore::new()), clock.clone())
            .unwrap();
        let engine = app.engine();
        let shutdown = app.shutdown_token();
        let handle = tokio::spawn(app.run());
        // Let the journal subscribe before anything is published
        tokio::time::sleep(Duration::from_millis(20)).await;

        let user = UserId::from("u1");
        engine.deposit(&user, 10_000).await.unwrap();
        engine
            .place_current_bet(&user, Direction::Up, 5_000, start, None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.cancel();
        handle.await.unwrap().unwrap();

        // Files are dated by the wall clock at recording time
        let content: String = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| std::fs::read_to_string(e.path()).unwrap())
            .collect();
        assert!(content.contains("\"type\":\"session_opened\""));
        assert!(content.contains("\"type\":\"bet_accepted\""));
    }
}
