//! Helpers shared by the creator and the poller.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{SolverError, SolverResult};

/// Sleep for `delay`, or fail with `Cancelled` if the token fires first.
pub(crate) async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> SolverResult<()> {
    run_or_cancel(tokio::time::sleep(delay), cancel).await
}

/// Drive `fut` to completion unless the token fires first.
pub(crate) async fn run_or_cancel<F: Future>(
    fut: F,
    cancel: &CancellationToken,
) -> SolverResult<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SolverError::Cancelled),
        out = fut => Ok(out),
    }
}

/// Phase-transition log line: `info` in debug mode, `debug` otherwise.
pub(crate) fn log_phase(debug: bool, args: fmt::Arguments<'_>) {
    if debug {
        tracing::info!("{}", args);
    } else {
        tracing::debug!("{}", args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_cancel() {
        let token = CancellationToken::new();
        let start = tokio::time::Instant::now();
        sleep_or_cancel(Duration::from_millis(250), &token).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let token = CancellationToken::new();
        let child = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            child.cancel();
        });

        let start = tokio::time::Instant::now();
        let result = sleep_or_cancel(Duration::from_secs(60), &token).await;
        assert!(matches!(result, Err(SolverError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_already_cancelled_wins() {
        let token = CancellationToken::new();
        token.cancel();
        let result = run_or_cancel(async { 7 }, &token).await;
        assert!(matches!(result, Err(SolverError::Cancelled)));
    }
}
