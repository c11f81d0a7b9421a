//! Shared fixtures for stream-service integration tests
//!
//! Everything runs against the in-memory store and a scripted provider, so no
//! external services are needed.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use stream_service::db::{MemoryDirectory, MemoryStore, PlatformCredential, Project};
use stream_service::models::{
    CreateStreamRequest, EncodingProfile, MultistreamTarget, Platform, TargetRequest,
};
use stream_service::providers::{
    CreateRemoteStream, MediaProvider, ProviderError, RemoteStream, RemoteStreamPatch,
};
use stream_service::services::LifecycleService;

pub const PLAYBACK_WEBHOOK_ID: &str = "wh_playback";

/// Provider double that keeps a set of live remote ids, the destinations
/// attached to each, and a call log.
#[derive(Default)]
pub struct FakeProvider {
    remotes: Mutex<HashSet<String>>,
    targets: Mutex<HashMap<String, Vec<String>>>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicUsize,
    fail_delete: AtomicBool,
    fail_transitions: AtomicBool,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_transitions(&self, fail: bool) {
        self.fail_transitions.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn has_remote(&self, remote_id: &str) -> bool {
        self.remotes.lock().unwrap().contains(remote_id)
    }

    /// Destinations registered on the remote stream.
    pub fn attached(&self, remote_id: &str) -> Vec<String> {
        self.targets
            .lock()
            .unwrap()
            .get(remote_id)
            .cloned()
            .unwrap_or_default()
    }

    fn log(&self, operation: &str) {
        self.calls.lock().unwrap().push(operation.to_string());
    }

    fn transition(&self, operation: &str, remote_id: &str) -> Result<bool, ProviderError> {
        self.log(operation);
        if self.fail_transitions.load(Ordering::SeqCst) {
            return Err(ProviderError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(self.has_remote(remote_id))
    }
}

#[async_trait]
impl MediaProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn create_stream(&self, _request: &CreateRemoteStream) -> Result<RemoteStream, ProviderError> {
        self.log("create");
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let remote_id = format!("remote-{n}");
        self.remotes.lock().unwrap().insert(remote_id.clone());
        Ok(RemoteStream {
            remote_id,
            playback_id: format!("play-{n}"),
            stream_key: format!("key-{n}"),
        })
    }

    async fn attach_multistream_target(
        &self,
        remote_id: &str,
        target: &MultistreamTarget,
    ) -> Result<bool, ProviderError> {
        let exists = self.transition("attach_target", remote_id)?;
        if exists {
            let push_url = target.push_url();
            let mut targets = self.targets.lock().unwrap();
            let attached = targets.entry(remote_id.to_string()).or_default();
            if !attached.contains(&push_url) {
                attached.push(push_url);
            }
        }
        Ok(exists)
    }

    async fn update_stream_profiles(
        &self,
        remote_id: &str,
        _profiles: &[EncodingProfile],
    ) -> Result<bool, ProviderError> {
        self.transition("update_profiles", remote_id)
    }

    async fn update_stream(&self, remote_id: &str, _patch: &RemoteStreamPatch) -> Result<bool, ProviderError> {
        self.transition("update", remote_id)
    }

    async fn suspend_stream(&self, remote_id: &str) -> Result<bool, ProviderError> {
        self.transition("suspend", remote_id)
    }

    async fn activate_stream(&self, remote_id: &str) -> Result<bool, ProviderError> {
        self.transition("activate", remote_id)
    }

    async fn terminate_stream(&self, remote_id: &str) -> Result<bool, ProviderError> {
        self.transition("terminate", remote_id)
    }

    async fn delete_stream(&self, remote_id: &str) -> Result<bool, ProviderError> {
        self.log("delete");
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ProviderError::Transport("connection reset".into()));
        }
        Ok(self.remotes.lock().unwrap().remove(remote_id))
    }
}

pub struct TestEnv {
    pub store: MemoryStore,
    pub directory: MemoryDirectory,
    pub provider: Arc<FakeProvider>,
    pub lifecycle: Arc<LifecycleService>,
    pub owner: Uuid,
    pub peer: Uuid,
    pub project_id: Uuid,
}

/// One project with an owner and a peer. The owner has a linked Twitch
/// account; YouTube is not linked.
pub async fn test_env() -> TestEnv {
    let store = MemoryStore::new();
    let directory = MemoryDirectory::new();
    let provider = FakeProvider::new();
    let owner = Uuid::new_v4();
    let peer = Uuid::new_v4();
    let project_id = Uuid::new_v4();

    directory
        .add_project(Project {
            id: project_id,
            owner_id: owner,
            peers: vec![peer],
        })
        .await;
    directory
        .add_credential(
            owner,
            PlatformCredential {
                platform: Platform::Twitch,
                access_token: "twitch-oauth".into(),
                refresh_token: None,
                expires_at: None,
                destination_stream_key: Some("live_123".into()),
            },
        )
        .await;

    let lifecycle = Arc::new(LifecycleService::new(
        Arc::new(store.clone()),
        provider.clone(),
        Arc::new(directory.clone()),
        Arc::new(directory.clone()),
        Some(PLAYBACK_WEBHOOK_ID.to_string()),
    ));

    TestEnv {
        store,
        directory,
        provider,
        lifecycle,
        owner,
        peer,
        project_id,
    }
}

pub fn create_request(title: &str) -> CreateStreamRequest {
    CreateStreamRequest {
        title: title.to_string(),
        description: None,
        profiles: vec![],
        schedule_date: None,
        platforms: vec![],
        visibility: true,
    }
}

pub fn target(platform: Platform) -> TargetRequest {
    TargetRequest {
        platform,
        profile: "source".to_string(),
        video_only: false,
        name: None,
        url: None,
        stream_key: None,
    }
}
