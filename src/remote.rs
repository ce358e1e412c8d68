use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;

/// Why a remote call did not produce a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    TimedOut(Duration),
    Cancelled,
}

impl From<Interrupted> for AppError {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::TimedOut(limit) => AppError::Timeout(limit),
            Interrupted::Cancelled => AppError::Cancelled,
        }
    }
}

/// Runs `fut` until it finishes, `limit` elapses, or `cancel` fires,
/// whichever comes first. The future is dropped on timeout or cancellation.
pub async fn bounded<F>(
    limit: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, Interrupted>
where
    F: Future,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(Interrupted::Cancelled),
        outcome = tokio::time::timeout(limit, fut) => {
            outcome.map_err(|_| Interrupted::TimedOut(limit))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_within_limit() {
        let cancel = CancellationToken::new();
        let value = bounded(Duration::from_secs(1), &cancel, async { 7 }).await;
        assert_eq!(value, Ok(7));
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let cancel = CancellationToken::new();
        let limit = Duration::from_millis(20);
        let value = bounded(limit, &cancel, tokio::time::sleep(Duration::from_secs(5))).await;
        assert_eq!(value, Err(Interrupted::TimedOut(limit)));
    }

    #[tokio::test]
    async fn cancelled_token_stops_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let value = bounded(Duration::from_secs(5), &cancel, tokio::time::sleep(Duration::from_secs(5))).await;
        assert_eq!(value, Err(Interrupted::Cancelled));
    }
}
