//! Managed cloud backend (Livepeer Studio REST API)

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::{
    clip_error_body, CreateRemoteStream, MediaProvider, PlaybackPolicy, ProviderError, RemoteStream,
    RemoteStreamPatch,
};
use crate::models::{EncodingProfile, MultistreamTarget};

pub struct LivepeerProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateStreamBody<'a> {
    name: &'a str,
    profiles: &'a [EncodingProfile],
    playback_policy: &'a PlaybackPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    multistream: Option<Multistream>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Multistream {
    #[serde(default)]
    targets: Vec<LivepeerTarget>,
}

/// Existing targets come back with an `id` only; new ones carry a `spec`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LivepeerTarget {
    profile: String,
    #[serde(default)]
    video_only: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    spec: Option<TargetSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TargetSpec {
    name: String,
    url: String,
}

impl From<&MultistreamTarget> for LivepeerTarget {
    fn from(target: &MultistreamTarget) -> Self {
        LivepeerTarget {
            profile: target.profile.clone(),
            video_only: target.video_only,
            id: None,
            spec: Some(TargetSpec {
                name: target.ingest.name.clone(),
                url: target.push_url(),
            }),
        }
    }
}

/// Stored destination as returned by `GET /multistream/target/{id}`. The
/// push URL is write-only on some API versions.
#[derive(Debug, Deserialize)]
struct StoredTarget {
    name: String,
    #[serde(default)]
    url: Option<String>,
}

impl StoredTarget {
    fn matches(&self, spec: &TargetSpec) -> bool {
        self.name == spec.name && self.url.as_ref().map_or(true, |url| *url == spec.url)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LivepeerStream {
    id: String,
    playback_id: Option<String>,
    stream_key: Option<String>,
    #[serde(default)]
    multistream: Option<Multistream>,
}

impl LivepeerProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send with auth. `Ok(None)` means the provider answered 404.
    async fn send(&self, request: RequestBuilder) -> Result<Option<reqwest::Response>, ProviderError> {
        let response = request.bearer_auth(&self.api_key).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: clip_error_body(body),
            });
        }
        Ok(Some(response))
    }

    async fn fetch(&self, remote_id: &str) -> Result<Option<LivepeerStream>, ProviderError> {
        match self.send(self.client.get(self.url(&format!("/stream/{remote_id}")))).await? {
            Some(response) => Ok(Some(response.json::<LivepeerStream>().await?)),
            None => Ok(None),
        }
    }

    async fn fetch_target(&self, target_id: &str) -> Result<Option<StoredTarget>, ProviderError> {
        let request = self
            .client
            .get(self.url(&format!("/multistream/target/{target_id}")));
        match self.send(request).await? {
            Some(response) => Ok(Some(response.json::<StoredTarget>().await?)),
            None => Ok(None),
        }
    }

    /// Whether `existing` already pushes to the destination in `spec`.
    async fn is_same_destination(
        &self,
        existing: &LivepeerTarget,
        spec: &TargetSpec,
    ) -> Result<bool, ProviderError> {
        if let Some(inline) = &existing.spec {
            return Ok(inline.name == spec.name && inline.url == spec.url);
        }
        let Some(target_id) = existing.id.as_deref() else {
            return Ok(false);
        };
        Ok(self
            .fetch_target(target_id)
            .await?
            .is_some_and(|stored| stored.matches(spec)))
    }

    async fn patch(&self, remote_id: &str, body: serde_json::Value) -> Result<bool, ProviderError> {
        let request = self
            .client
            .patch(self.url(&format!("/stream/{remote_id}")))
            .json(&body);
        Ok(self.send(request).await?.is_some())
    }

    async fn delete(&self, path: String) -> Result<bool, ProviderError> {
        Ok(self.send(self.client.delete(self.url(&path))).await?.is_some())
    }
}

#[async_trait]
impl MediaProvider for LivepeerProvider {
    fn name(&self) -> &'static str {
        "livepeer"
    }

    async fn create_stream(&self, request: &CreateRemoteStream) -> Result<RemoteStream, ProviderError> {
        let body = CreateStreamBody {
            name: &request.name,
            profiles: &request.profiles,
            playback_policy: &request.playback_policy,
            multistream: (!request.targets.is_empty()).then(|| Multistream {
                targets: request.targets.iter().map(LivepeerTarget::from).collect(),
            }),
        };

        let response = self
            .send(self.client.post(self.url("/stream")).json(&body))
            .await?
            .ok_or_else(|| ProviderError::Status {
                status: 404,
                body: "stream endpoint not found".to_string(),
            })?;
        let created: LivepeerStream = response.json().await?;

        let playback_id = created
            .playback_id
            .ok_or_else(|| ProviderError::Decode("missing playbackId".to_string()))?;
        let stream_key = created
            .stream_key
            .ok_or_else(|| ProviderError::Decode("missing streamKey".to_string()))?;

        debug!(remote_id = %created.id, "Livepeer stream created");
        Ok(RemoteStream {
            remote_id: created.id,
            playback_id,
            stream_key,
        })
    }

    async fn attach_multistream_target(
        &self,
        remote_id: &str,
        target: &MultistreamTarget,
    ) -> Result<bool, ProviderError> {
        let Some(stream) = self.fetch(remote_id).await? else {
            return Ok(false);
        };

        let mut targets = stream.multistream.unwrap_or_default().targets;
        let wanted = LivepeerTarget::from(target);
        if let Some(spec) = &wanted.spec {
            for existing in &targets {
                if self.is_same_destination(existing, spec).await? {
                    debug!(remote_id, platform = %target.platform, "Multistream target already attached");
                    return Ok(true);
                }
            }
        }
        targets.push(wanted);

        self.patch(remote_id, json!({ "multistream": { "targets": targets } }))
            .await
    }

    async fn update_stream_profiles(
        &self,
        remote_id: &str,
        profiles: &[EncodingProfile],
    ) -> Result<bool, ProviderError> {
        self.patch(remote_id, json!({ "profiles": profiles })).await
    }

    async fn update_stream(&self, remote_id: &str, patch: &RemoteStreamPatch) -> Result<bool, ProviderError> {
        if patch.is_empty() {
            return Ok(self.fetch(remote_id).await?.is_some());
        }

        let mut body = serde_json::Map::new();
        if let Some(name) = &patch.name {
            body.insert("name".to_string(), json!(name));
        }
        if let Some(policy) = &patch.playback_policy {
            let policy = serde_json::to_value(policy)
                .map_err(|e| ProviderError::Decode(e.to_string()))?;
            body.insert("playbackPolicy".to_string(), policy);
        }
        self.patch(remote_id, serde_json::Value::Object(body)).await
    }

    async fn suspend_stream(&self, remote_id: &str) -> Result<bool, ProviderError> {
        self.patch(remote_id, json!({ "suspended": true })).await
    }

    async fn activate_stream(&self, remote_id: &str) -> Result<bool, ProviderError> {
        self.patch(remote_id, json!({ "suspended": false })).await
    }

    async fn terminate_stream(&self, remote_id: &str) -> Result<bool, ProviderError> {
        self.delete(format!("/stream/{remote_id}/terminate")).await
    }

    async fn delete_stream(&self, remote_id: &str) -> Result<bool, ProviderError> {
        self.delete(format!("/stream/{remote_id}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Platform, TargetIngest};
    use chrono::Utc;
    use uuid::Uuid;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> LivepeerProvider {
        LivepeerProvider::new(server.uri(), "test-key", Duration::from_secs(5)).unwrap()
    }

    fn twitch_target() -> MultistreamTarget {
        MultistreamTarget {
            id: Uuid::new_v4(),
            stream_id: Uuid::new_v4(),
            platform: Platform::Twitch,
            profile: "720p".into(),
            video_only: false,
            ingest: TargetIngest {
                name: "Twitch".into(),
                url: "rtmp://live.twitch.tv/app".into(),
                stream_key: "live_abc".into(),
            },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_sends_targets_and_reads_identity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/stream"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_json(json!({
                "name": "launch",
                "profiles": [],
                "playbackPolicy": {"type": "public"},
                "multistream": {"targets": [{
                    "profile": "720p",
                    "videoOnly": false,
                    "spec": {"name": "Twitch", "url": "rtmp://live.twitch.tv/app/live_abc"}
                }]}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "rs_1", "playbackId": "pb_1", "streamKey": "sk_1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let remote = provider(&server)
            .create_stream(&CreateRemoteStream {
                name: "launch".into(),
                profiles: vec![],
                playback_policy: PlaybackPolicy::Public,
                targets: vec![twitch_target()],
            })
            .await
            .unwrap();

        assert_eq!(remote.remote_id, "rs_1");
        assert_eq!(remote.playback_id, "pb_1");
        assert_eq!(remote.stream_key, "sk_1");
    }

    #[tokio::test]
    async fn suspend_patches_flag() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/stream/rs_1"))
            .and(body_json(json!({"suspended": true})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        assert!(provider(&server).suspend_stream("rs_1").await.unwrap());
    }

    #[tokio::test]
    async fn empty_patch_only_checks_existence() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream/rs_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "rs_1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        assert!(provider(&server)
            .update_stream("rs_1", &RemoteStreamPatch::default())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn missing_stream_reports_false() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/stream/gone/terminate"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(!provider(&server).terminate_stream("gone").await.unwrap());
    }

    #[tokio::test]
    async fn attach_keeps_existing_targets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream/rs_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "rs_1",
                "multistream": {"targets": [{"id": "t_old", "profile": "source", "videoOnly": true}]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/multistream/target/t_old"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "t_old", "name": "Studio relay"
            })))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/stream/rs_1"))
            .and(body_json(json!({"multistream": {"targets": [
                {"id": "t_old", "profile": "source", "videoOnly": true},
                {"profile": "720p", "videoOnly": false,
                 "spec": {"name": "Twitch", "url": "rtmp://live.twitch.tv/app/live_abc"}}
            ]}})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        assert!(provider(&server)
            .attach_multistream_target("rs_1", &twitch_target())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn attach_is_a_no_op_when_the_destination_is_present() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream/rs_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "rs_1",
                "multistream": {"targets": [{"id": "t1", "profile": "720p", "videoOnly": false}]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/multistream/target/t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "t1", "name": "Twitch", "url": "rtmp://live.twitch.tv/app/live_abc"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        assert!(provider(&server)
            .attach_multistream_target("rs_1", &twitch_target())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn multibyte_error_body_is_clipped() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/stream/rs_1"))
            .respond_with(
                ResponseTemplate::new(500).set_body_string(format!("{}é", "a".repeat(511))),
            )
            .mount(&server)
            .await;

        let err = provider(&server).suspend_stream("rs_1").await.unwrap_err();
        match err {
            ProviderError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "a".repeat(511));
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_is_transient_status() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = provider(&server).activate_stream("rs_1").await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 503, .. }));
        assert!(err.is_transient());
    }
}
