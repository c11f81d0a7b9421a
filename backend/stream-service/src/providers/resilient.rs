//! Timeout + retry decorator for any [`MediaProvider`]

use async_trait::async_trait;
use resilience::{CallError, CallPolicy};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use super::{
    CreateRemoteStream, MediaProvider, ProviderError, RemoteStream, RemoteStreamPatch,
};
use crate::metrics;
use crate::models::{EncodingProfile, MultistreamTarget};

/// Bounds every call with a per-attempt timeout. Only transient failures are
/// retried, and calls that could create duplicates remotely (create, attach
/// target) get a single attempt.
pub struct ResilientProvider {
    inner: Arc<dyn MediaProvider>,
    idempotent: CallPolicy,
    single_attempt: CallPolicy,
}

impl ResilientProvider {
    pub fn new(inner: Arc<dyn MediaProvider>, policy: CallPolicy) -> Self {
        let single_attempt = CallPolicy {
            timeout: policy.timeout,
            retry: None,
        };
        Self {
            inner,
            idempotent: policy,
            single_attempt,
        }
    }

    async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        policy: &CallPolicy,
        f: F,
    ) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let started = Instant::now();
        let result = resilience::call(policy, operation, f, ProviderError::is_transient)
            .await
            .map_err(|err| match err {
                CallError::Timeout(after) => ProviderError::Timeout(after),
                CallError::Failed(inner) => inner,
            });

        metrics::observe_provider_call(
            self.inner.name(),
            operation,
            result.is_ok(),
            started.elapsed(),
        );
        if let Err(e) = &result {
            warn!(provider = self.inner.name(), operation, error = %e, "Provider call failed");
        }
        result
    }
}

#[async_trait]
impl MediaProvider for ResilientProvider {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn create_stream(&self, request: &CreateRemoteStream) -> Result<RemoteStream, ProviderError> {
        self.run("create_stream", &self.single_attempt, || {
            self.inner.create_stream(request)
        })
        .await
    }

    async fn attach_multistream_target(
        &self,
        remote_id: &str,
        target: &MultistreamTarget,
    ) -> Result<bool, ProviderError> {
        self.run("attach_multistream_target", &self.single_attempt, || {
            self.inner.attach_multistream_target(remote_id, target)
        })
        .await
    }

    async fn update_stream_profiles(
        &self,
        remote_id: &str,
        profiles: &[EncodingProfile],
    ) -> Result<bool, ProviderError> {
        self.run("update_stream_profiles", &self.idempotent, || {
            self.inner.update_stream_profiles(remote_id, profiles)
        })
        .await
    }

    async fn update_stream(&self, remote_id: &str, patch: &RemoteStreamPatch) -> Result<bool, ProviderError> {
        self.run("update_stream", &self.idempotent, || {
            self.inner.update_stream(remote_id, patch)
        })
        .await
    }

    async fn suspend_stream(&self, remote_id: &str) -> Result<bool, ProviderError> {
        self.run("suspend_stream", &self.idempotent, || {
            self.inner.suspend_stream(remote_id)
        })
        .await
    }

    async fn activate_stream(&self, remote_id: &str) -> Result<bool, ProviderError> {
        self.run("activate_stream", &self.idempotent, || {
            self.inner.activate_stream(remote_id)
        })
        .await
    }

    async fn terminate_stream(&self, remote_id: &str) -> Result<bool, ProviderError> {
        self.run("terminate_stream", &self.idempotent, || {
            self.inner.terminate_stream(remote_id)
        })
        .await
    }

    async fn delete_stream(&self, remote_id: &str) -> Result<bool, ProviderError> {
        self.run("delete_stream", &self.idempotent, || {
            self.inner.delete_stream(remote_id)
        })
        .await
    }
}
