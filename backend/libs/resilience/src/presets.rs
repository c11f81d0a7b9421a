//! Policies used for outbound media-provider calls.

use crate::policy::CallPolicy;
use crate::retry::RetryConfig;
use std::time::Duration;

/// Idempotent provider calls (get, update, suspend, activate, delete).
pub fn media_provider() -> CallPolicy {
    CallPolicy {
        timeout: Duration::from_secs(10),
        retry: Some(RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }),
    }
}

/// Calls that may create remote resources; a retry could duplicate them.
pub fn media_provider_non_idempotent() -> CallPolicy {
    CallPolicy {
        timeout: Duration::from_secs(10),
        retry: None,
    }
}

/// Build a policy from configured values.
pub fn from_settings(timeout: Duration, max_retries: u32, initial_backoff: Duration) -> CallPolicy {
    CallPolicy {
        timeout,
        retry: (max_retries > 0).then(|| RetryConfig {
            max_retries,
            initial_backoff,
            ..media_provider().retry.unwrap_or_default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_idempotent_disables_retry() {
        assert!(media_provider_non_idempotent().retry.is_none());
        assert!(media_provider().retry.is_some());
    }

    #[test]
    fn test_from_settings_zero_retries() {
        let policy = from_settings(Duration::from_secs(2), 0, Duration::from_millis(10));
        assert!(policy.retry.is_none());
        assert_eq!(policy.timeout, Duration::from_secs(2));
    }
}
