//! Bounded waits around suspending and CPU-bound steps.

use std::future::Future;
use std::time::Duration;

use crisp_core::EngineError;

/// Await `fut`, failing with `EngineError::Timeout` after `limit`
pub async fn bounded<F, T>(operation: &'static str, limit: Duration, fut: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EngineError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, limit_ms = limit.as_millis() as u64, "Step timed out");
            Err(EngineError::timeout(operation, limit))
        }
    }
}

/// Run CPU-bound `work` on the blocking pool, bounded by `limit`.
///
/// A timed-out task keeps running to completion on its blocking thread;
/// its result is discarded.
pub async fn bounded_blocking<F, T>(
    operation: &'static str,
    limit: Duration,
    work: F,
) -> Result<T, EngineError>
where
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    T: Send + 'static,
{
    bounded(operation, limit, async move {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| EngineError::Internal(format!("{} task failed: {}", operation, e)))?
    })
    .await
}
