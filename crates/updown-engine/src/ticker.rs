//! Periodic scheduler driving [`Engine::tick`].

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use updown_core::Clock;

use crate::engine::Engine;

/// Tick `engine` every `tick_interval_ms` until `cancel` fires.
///
/// A slow tick delays the next one instead of queueing a burst.
pub async fn run_ticker(engine: Arc<Engine>, clock: Arc<dyn Clock>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(engine.config().tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        asset = engine.asset(),
        interval_ms = engine.config().tick_interval_ms,
        "Ticker started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Ticker stopped");
                break;
            }
            _ = interval.tick() => {
                let report = engine.tick(clock.now(), Some(&cancel)).await;
                if !report.is_clean() {
                    debug!(
                        failed = ?report.failed_stages,
                        "Tick incomplete, retrying next interval"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use updown_core::{ManualClock, SessionStatus};
    use updown_store::MemoryStore;

    use crate::config::EngineConfig;

    #[tokio::test]
    async fn test_ticker_opens_and_locks_until_cancelled() {
        let config = EngineConfig {
            tick_interval_ms: 10,
            ..Default::default()
        };
        let engine = Arc::new(Engine::new(config, Arc::new(MemoryStore::new())).unwrap());
        let start = Utc.with_ymd_and_hms(2025, 7, 8, 10, 15, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_ticker(
            Arc::clone(&engine),
            clock.clone(),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let first = engine.current_session(start).await.unwrap().unwrap();
        assert_eq!(first.status, SessionStatus::Open);

        clock.advance(chrono::Duration::seconds(60));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let first = engine.current_session(start).await.unwrap().unwrap();
        assert_eq!(first.status, SessionStatus::Locked);
        assert!(engine.current_session(clock.now()).await.unwrap().is_some());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
