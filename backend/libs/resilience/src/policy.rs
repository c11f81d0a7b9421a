//! Per-call policy: every attempt gets its own deadline, and elapsed
//! deadlines are treated as transient when retries are enabled.

use crate::retry::{with_retry_if, RetryConfig, RetryError};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CallPolicy {
    pub timeout: Duration,
    /// `None` disables retries (non-idempotent calls)
    pub retry: Option<RetryConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum CallError<E> {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Failed(E),
}

impl<E> CallError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Timeout(_))
    }
}

/// Run `f` under `policy`. `is_transient` decides which failures may be retried.
pub async fn call<F, Fut, T, E, P>(
    policy: &CallPolicy,
    operation: &'static str,
    mut f: F,
    is_transient: P,
) -> Result<T, CallError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let deadline = policy.timeout;
    let attempt = move || {
        let fut = f();
        async move {
            match tokio::time::timeout(deadline, fut).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(CallError::Failed(err)),
                Err(_) => {
                    tracing::warn!(operation, timeout_ms = deadline.as_millis() as u64, "Call timed out");
                    Err(CallError::Timeout(deadline))
                }
            }
        }
    };

    match &policy.retry {
        None => {
            let mut attempt = attempt;
            attempt().await
        }
        Some(config) => with_retry_if(config, attempt, |err: &CallError<E>| match err {
            CallError::Timeout(_) => true,
            CallError::Failed(inner) => is_transient(inner),
        })
        .await
        .map_err(RetryError::into_inner),
    }
}
