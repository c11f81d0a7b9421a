/// Timeout wrapper for a single attempt
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("{operation} timed out after {after:?}")]
    Elapsed {
        operation: &'static str,
        after: Duration,
    },
}

/// Run `future` to completion or fail once `duration` has passed.
pub async fn with_timeout<F, T>(
    operation: &'static str,
    duration: Duration,
    future: F,
) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError::Elapsed {
            operation,
            after: duration,
        })
}
