//! Timing combinators

use std::future::Future;
use std::time::{Duration, Instant};

/// Await `fut` and return its output together with the wall-clock time it took
pub async fn timed<F: Future>(fut: F) -> (F::Output, Duration) {
    let start = Instant::now();
    let output = fut.await;
    (output, start.elapsed())
}

/// Like [`timed`], logging a warning when the future ran longer than `threshold`
pub async fn timed_with_threshold<F: Future>(
    label: &str,
    threshold: Duration,
    fut: F,
) -> (F::Output, Duration) {
    let (output, elapsed) = timed(fut).await;
    if elapsed > threshold {
        tracing::warn!(
            label = %label,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            threshold_ms = threshold.as_millis() as u64,
            "slow operation"
        );
    }
    (output, elapsed)
}
