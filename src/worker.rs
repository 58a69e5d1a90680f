use std::time::Instant;
use tracing::debug;

use crate::error::{ForecastError, ForecastResult};

/// Runs blocking work (model fit, inference, artifact IO) on the blocking
/// pool and waits for it. A panic or cancellation becomes `ForecastError::Worker`.
pub async fn run_blocking<T, F>(stage: &'static str, f: F) -> ForecastResult<T>
where
    F: FnOnce() -> ForecastResult<T> + Send + 'static,
    T: Send + 'static,
{
    let started = Instant::now();
    let result = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ForecastError::Worker(format!("{stage}: {e}")))?;
    debug!(stage, elapsed_ms = started.elapsed().as_millis() as u64, ok = result.is_ok(), "blocking job finished");
    result
}
