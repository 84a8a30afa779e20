//! Bounded store calls.
//!
//! Every store round-trip carries a timeout and, where the caller
//! supplied one, a cancellation token. A timeout is reported as
//! `StoreUnavailable` so callers treat it like any other transient outage.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use updown_store::StoreResult;
use updown_telemetry::Metrics;

use crate::error::{EngineError, EngineResult};

/// Run a store future under `timeout`, aborting early if `cancel` fires.
///
/// An already-cancelled token short-circuits before the store is polled.
pub(crate) async fn bounded<T, F>(
    op: &'static str,
    timeout: Duration,
    cancel: Option<&CancellationToken>,
    fut: F,
) -> EngineResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    let timed = async {
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => {
                Metrics::store_timeout(op);
                Err(EngineError::StoreUnavailable(format!(
                    "{op} timed out after {}ms",
                    timeout.as_millis()
                )))
            }
        }
    };

    match cancel {
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(EngineError::Cancelled),
                result = timed => result,
            }
        }
        None => timed.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use updown_store::StoreError;

    #[tokio::test]
    async fn test_passes_through_result() {
        let ok = bounded("test", Duration::from_secs(1), None, async {
            Ok::<_, StoreError>(7)
        })
        .await;
        assert_eq!(ok, Ok(7));

        let err = bounded("test", Duration::from_secs(1), None, async {
            Err::<(), _>(StoreError::Unavailable("down".to_string()))
        })
        .await;
        assert!(matches!(err, Err(EngineError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_unavailable() {
        let result = bounded("slow", Duration::from_millis(10), None, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StoreError>(())
        })
        .await;
        assert!(matches!(result, Err(EngineError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let result = bounded("cancelled", Duration::from_secs(1), Some(&token), async {
            Ok::<_, StoreError>(1)
        })
        .await;
        assert_eq!(result, Err(EngineError::Cancelled));
    }
}
