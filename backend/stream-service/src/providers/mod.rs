//! Media provider gateway
//!
//! The lifecycle service talks to the external media system only through
//! [`MediaProvider`]. Two backends implement it: a managed cloud API
//! ([`livepeer::LivepeerProvider`]) and a self-hosted real-time gateway
//! ([`janus::JanusProvider`]). [`resilient::ResilientProvider`] wraps either
//! one with timeouts and retries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::models::{EncodingProfile, MultistreamTarget};

pub mod janus;
pub mod livepeer;
pub mod resilient;

pub use janus::JanusProvider;
pub use livepeer::LivepeerProvider;
pub use resilient::ResilientProvider;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("gateway rejected request ({code}): {reason}")]
    Gateway { code: i64, reason: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected provider response: {0}")]
    Decode(String),

    #[error("remote stream {0} does not exist")]
    RemoteMissing(String),

    #[error("invalid provider configuration: {0}")]
    InvalidConfig(String),
}

impl ProviderError {
    /// Failures worth retrying: the request may not have been processed, or
    /// the provider asked us to back off.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transport(_) | ProviderError::Timeout(_) => true,
            ProviderError::Status { status, .. } => *status >= 500 || *status == 429,
            ProviderError::Gateway { .. }
            | ProviderError::Decode(_)
            | ProviderError::RemoteMissing(_)
            | ProviderError::InvalidConfig(_) => false,
        }
    }
}

/// Longest error body kept on [`ProviderError::Status`], in bytes
const MAX_ERROR_BODY: usize = 512;

/// Shorten a provider error body to [`MAX_ERROR_BODY`] bytes without
/// splitting a UTF-8 character.
pub(crate) fn clip_error_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    body
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ProviderError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

/// Who may watch the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlaybackPolicy {
    Public,
    /// Viewers present an access key that the provider checks via webhook
    Webhook {
        #[serde(rename = "webhookId")]
        webhook_id: String,
        #[serde(rename = "webhookContext")]
        webhook_context: serde_json::Value,
    },
}

impl PlaybackPolicy {
    pub fn is_public(&self) -> bool {
        matches!(self, PlaybackPolicy::Public)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateRemoteStream {
    pub name: String,
    pub profiles: Vec<EncodingProfile>,
    pub playback_policy: PlaybackPolicy,
    pub targets: Vec<MultistreamTarget>,
}

/// Identity handed back by the provider on creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStream {
    pub remote_id: String,
    pub playback_id: String,
    pub stream_key: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteStreamPatch {
    pub name: Option<String>,
    pub playback_policy: Option<PlaybackPolicy>,
}

impl RemoteStreamPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.playback_policy.is_none()
    }
}

/// Operations on a remote stream resource.
///
/// The `bool` results report whether the remote stream exists; transport and
/// provider rejections are `Err`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Backend name for logs and metrics
    fn name(&self) -> &'static str;

    async fn create_stream(&self, request: &CreateRemoteStream) -> Result<RemoteStream, ProviderError>;

    /// Registering a target that is already present succeeds without change.
    async fn attach_multistream_target(
        &self,
        remote_id: &str,
        target: &MultistreamTarget,
    ) -> Result<bool, ProviderError>;

    /// Replace the remote rendition ladder with `profiles`.
    async fn update_stream_profiles(
        &self,
        remote_id: &str,
        profiles: &[EncodingProfile],
    ) -> Result<bool, ProviderError>;

    async fn update_stream(&self, remote_id: &str, patch: &RemoteStreamPatch) -> Result<bool, ProviderError>;

    async fn suspend_stream(&self, remote_id: &str) -> Result<bool, ProviderError>;

    async fn activate_stream(&self, remote_id: &str) -> Result<bool, ProviderError>;

    async fn terminate_stream(&self, remote_id: &str) -> Result<bool, ProviderError>;

    async fn delete_stream(&self, remote_id: &str) -> Result<bool, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transient_classification() {
        assert!(ProviderError::Transport("reset".into()).is_transient());
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ProviderError::Status { status: 503, body: String::new() }.is_transient());
        assert!(ProviderError::Status { status: 429, body: String::new() }.is_transient());
        assert!(!ProviderError::Status { status: 422, body: String::new() }.is_transient());
        assert!(!ProviderError::Gateway { code: 455, reason: "no such mountpoint".into() }.is_transient());
    }

    #[test]
    fn error_body_is_clipped_on_a_char_boundary() {
        let body = format!("{}é", "a".repeat(MAX_ERROR_BODY - 1));
        assert_eq!(clip_error_body(body), "a".repeat(MAX_ERROR_BODY - 1));

        let body = "日本語".repeat(200);
        let clipped = clip_error_body(body);
        assert!(clipped.len() <= MAX_ERROR_BODY);
        assert!(clipped.chars().all(|c| "日本語".contains(c)));

        assert_eq!(clip_error_body("short".to_string()), "short");
    }

    #[test]
    fn playback_policy_wire_format() {
        assert_eq!(
            serde_json::to_value(PlaybackPolicy::Public).unwrap(),
            json!({"type": "public"})
        );
        let policy = PlaybackPolicy::Webhook {
            webhook_id: "wh_1".into(),
            webhook_context: json!({"projectId": "p1"}),
        };
        assert_eq!(
            serde_json::to_value(policy).unwrap(),
            json!({"type": "webhook", "webhookId": "wh_1", "webhookContext": {"projectId": "p1"}})
        );
    }
}
