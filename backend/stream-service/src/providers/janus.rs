//! Self-hosted real-time gateway backend (Janus streaming plugin over HTTP)
//!
//! Each operation opens a short-lived session, attaches to the streaming
//! plugin, sends one synchronous request and destroys the session. A stream
//! maps to one mountpoint; the mountpoint id doubles as remote id and
//! playback id. The gateway has no transcoding ladder or restreaming, so
//! profile and target updates only confirm that the mountpoint exists.

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    clip_error_body, CreateRemoteStream, MediaProvider, ProviderError, RemoteStream, RemoteStreamPatch,
};
use crate::models::{EncodingProfile, MultistreamTarget};

const STREAMING_PLUGIN: &str = "janus.plugin.streaming";
/// Streaming plugin error for an unknown mountpoint
const NO_SUCH_MOUNTPOINT: i64 = 455;
const MOUNTPOINTS_PER_ROOM: u64 = 1_000_000;

pub struct JanusProvider {
    client: Client,
    base_url: String,
    api_secret: Option<String>,
    /// First mountpoint id of the configured room
    mountpoint_base: u64,
}

#[derive(Debug, Deserialize)]
struct JanusResponse {
    janus: String,
    #[serde(default)]
    data: Option<IdData>,
    #[serde(default)]
    plugindata: Option<PluginData>,
    #[serde(default)]
    error: Option<JanusErrorBody>,
}

#[derive(Debug, Deserialize)]
struct IdData {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct PluginData {
    data: Value,
}

#[derive(Debug, Deserialize)]
struct JanusErrorBody {
    code: i64,
    reason: String,
}

struct Session {
    session_id: u64,
    handle_id: u64,
}

/// Outcome of one plugin request.
enum PluginReply {
    Done,
    NoSuchMountpoint,
}

impl JanusProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_secret: Option<String>,
        room_id: u64,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let mountpoint_base = room_id
            .checked_mul(MOUNTPOINTS_PER_ROOM)
            .filter(|base| base.checked_add(MOUNTPOINTS_PER_ROOM).is_some())
            .ok_or_else(|| {
                ProviderError::InvalidConfig(format!("Janus room id {room_id} is out of range"))
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_secret,
            mountpoint_base,
        })
    }

    fn transaction() -> String {
        random_token(12)
    }

    /// Mountpoint ids are namespaced by the configured room.
    fn allocate_mountpoint_id(&self) -> u64 {
        self.mountpoint_base + rand::thread_rng().gen_range(1..MOUNTPOINTS_PER_ROOM)
    }

    async fn post(&self, url: String, mut body: Value) -> Result<JanusResponse, ProviderError> {
        body["transaction"] = json!(Self::transaction());
        if let Some(secret) = &self.api_secret {
            body["apisecret"] = json!(secret);
        }

        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: clip_error_body(text),
            });
        }

        let reply: JanusResponse = response.json().await?;
        if reply.janus == "error" {
            let error = reply.error.unwrap_or(JanusErrorBody {
                code: 0,
                reason: "unknown gateway error".to_string(),
            });
            return Err(ProviderError::Gateway {
                code: error.code,
                reason: error.reason,
            });
        }
        Ok(reply)
    }

    async fn open(&self) -> Result<Session, ProviderError> {
        let created = self
            .post(self.base_url.clone(), json!({ "janus": "create" }))
            .await?;
        let session_id = created
            .data
            .map(|d| d.id)
            .ok_or_else(|| ProviderError::Decode("session id missing".to_string()))?;

        let attached = self
            .post(
                format!("{}/{}", self.base_url, session_id),
                json!({ "janus": "attach", "plugin": STREAMING_PLUGIN }),
            )
            .await;
        let handle_id = match attached.map(|r| r.data.map(|d| d.id)) {
            Ok(Some(id)) => id,
            Ok(None) => {
                self.close_session(session_id).await;
                return Err(ProviderError::Decode("plugin handle id missing".to_string()));
            }
            Err(e) => {
                self.close_session(session_id).await;
                return Err(e);
            }
        };

        Ok(Session {
            session_id,
            handle_id,
        })
    }

    async fn close_session(&self, session_id: u64) {
        let result = self
            .post(
                format!("{}/{}", self.base_url, session_id),
                json!({ "janus": "destroy" }),
            )
            .await;
        if let Err(e) = result {
            warn!(session_id, error = %e, "Failed to destroy Janus session");
        }
    }

    /// Send one streaming-plugin request inside a fresh session.
    async fn plugin_request(&self, body: Value) -> Result<PluginReply, ProviderError> {
        let session = self.open().await?;
        let result = self
            .post(
                format!("{}/{}/{}", self.base_url, session.session_id, session.handle_id),
                json!({ "janus": "message", "body": body }),
            )
            .await;
        self.close_session(session.session_id).await;

        let data = result?
            .plugindata
            .map(|p| p.data)
            .ok_or_else(|| ProviderError::Decode("plugindata missing".to_string()))?;

        match data.get("error_code").and_then(Value::as_i64) {
            None => Ok(PluginReply::Done),
            Some(NO_SUCH_MOUNTPOINT) => Ok(PluginReply::NoSuchMountpoint),
            Some(code) => Err(ProviderError::Gateway {
                code,
                reason: data
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("streaming plugin error")
                    .to_string(),
            }),
        }
    }

    /// Mountpoint request that reports `false` for an unknown mountpoint.
    async fn mountpoint_request(
        &self,
        remote_id: &str,
        request: &str,
        extra: Value,
    ) -> Result<bool, ProviderError> {
        let Some(id) = parse_mountpoint_id(remote_id) else {
            return Ok(false);
        };

        let mut body = json!({ "request": request, "id": id });
        if let (Some(target), Value::Object(fields)) = (body.as_object_mut(), extra) {
            target.extend(fields);
        }

        match self.plugin_request(body).await? {
            PluginReply::Done => Ok(true),
            PluginReply::NoSuchMountpoint => Ok(false),
        }
    }
}

fn parse_mountpoint_id(remote_id: &str) -> Option<u64> {
    remote_id.parse().ok()
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[async_trait]
impl MediaProvider for JanusProvider {
    fn name(&self) -> &'static str {
        "janus"
    }

    async fn create_stream(&self, request: &CreateRemoteStream) -> Result<RemoteStream, ProviderError> {
        let mountpoint_id = self.allocate_mountpoint_id();
        if !request.profiles.is_empty() || !request.targets.is_empty() {
            debug!(
                mountpoint_id,
                profiles = request.profiles.len(),
                targets = request.targets.len(),
                "Janus ignores encoding profiles and multistream targets"
            );
        }

        let body = json!({
            "request": "create",
            "type": "rtp",
            "id": mountpoint_id,
            "name": request.name,
            "description": request.name,
            "is_private": !request.playback_policy.is_public(),
            "permanent": false,
            "media": [
                { "type": "video", "mid": "v", "port": 0, "codec": "vp8", "pt": 100 },
                { "type": "audio", "mid": "a", "port": 0, "codec": "opus", "pt": 111 }
            ]
        });

        match self.plugin_request(body).await? {
            PluginReply::Done => {}
            PluginReply::NoSuchMountpoint => {
                return Err(ProviderError::Decode(
                    "gateway reported missing mountpoint on create".to_string(),
                ))
            }
        }

        debug!(mountpoint_id, "Janus mountpoint created");
        Ok(RemoteStream {
            remote_id: mountpoint_id.to_string(),
            playback_id: mountpoint_id.to_string(),
            stream_key: random_token(32),
        })
    }

    async fn attach_multistream_target(
        &self,
        remote_id: &str,
        target: &MultistreamTarget,
    ) -> Result<bool, ProviderError> {
        debug!(
            remote_id,
            platform = %target.platform,
            "Janus has no restream support; checking mountpoint only"
        );
        self.mountpoint_request(remote_id, "info", Value::Null).await
    }

    async fn update_stream_profiles(
        &self,
        remote_id: &str,
        _profiles: &[EncodingProfile],
    ) -> Result<bool, ProviderError> {
        self.mountpoint_request(remote_id, "info", Value::Null).await
    }

    async fn update_stream(&self, remote_id: &str, patch: &RemoteStreamPatch) -> Result<bool, ProviderError> {
        if patch.is_empty() {
            return self.mountpoint_request(remote_id, "info", Value::Null).await;
        }

        let mut edit = json!({});
        if let Some(name) = &patch.name {
            edit["new_description"] = json!(name);
        }
        if let Some(policy) = &patch.playback_policy {
            edit["new_is_private"] = json!(!policy.is_public());
        }
        self.mountpoint_request(remote_id, "edit", edit).await
    }

    async fn suspend_stream(&self, remote_id: &str) -> Result<bool, ProviderError> {
        self.mountpoint_request(remote_id, "disable", Value::Null).await
    }

    async fn activate_stream(&self, remote_id: &str) -> Result<bool, ProviderError> {
        self.mountpoint_request(remote_id, "enable", Value::Null).await
    }

    async fn terminate_stream(&self, remote_id: &str) -> Result<bool, ProviderError> {
        self.mountpoint_request(remote_id, "disable", json!({ "stop_recording": true }))
            .await
    }

    async fn delete_stream(&self, remote_id: &str) -> Result<bool, ProviderError> {
        self.mountpoint_request(remote_id, "destroy", json!({ "permanent": false }))
            .await
    }
}
