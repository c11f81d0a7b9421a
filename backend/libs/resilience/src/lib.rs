/// Resilience primitives for calls that leave the process
///
/// Every request to an external media provider goes through these helpers:
/// - **Timeout**: bounds a single attempt
/// - **Retry**: exponential backoff with jitter, limited to failures the caller
///   classifies as transient
/// - **Policy**: one attempt budget + retry schedule per kind of dependency
///
/// # Example: bounded provider call
///
/// ```rust,no_run
/// use resilience::{policy, presets};
///
/// #[tokio::main]
/// async fn main() {
///     let call_policy = presets::media_provider();
///
///     let result = policy::call(&call_policy, "suspend_stream", || async {
///         // HTTP request to the provider
///         Ok::<_, String>(true)
///     }, |_err| true).await;
/// }
/// ```

pub mod policy;
pub mod presets;
pub mod retry;
pub mod timeout;

pub use policy::{call, CallError, CallPolicy};
pub use retry::{with_retry, with_retry_if, RetryConfig, RetryError};
pub use timeout::{with_timeout, TimeoutError};
