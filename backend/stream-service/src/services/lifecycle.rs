//! Stream lifecycle orchestration
//!
//! Every change to an existing stream runs the same pipeline inside one
//! store transaction:
//!
//! 1. load and lock the stream
//! 2. check the transition against the current status
//! 3. authorize the actor
//! 4. record an intent (outside the transaction)
//! 5. call the media provider
//! 6. persist with a version check, commit, resolve the intent
//!
//! Any error before the commit drops the transaction, which rolls it back,
//! so the stored record is unchanged when the provider refuses.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::{CredentialDirectory, Project, ProjectDirectory, StreamStore, StreamTransaction};
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{
    CreateStreamRequest, IntentOperation, IntentOutcome, Page, PageMeta, Stream, StreamChanges,
    StreamIntent, StreamListView, StreamSingleView, StreamStatus, TargetRequest, Transition,
};
use crate::providers::{
    CreateRemoteStream, MediaProvider, PlaybackPolicy, ProviderError, RemoteStreamPatch,
};
use crate::services::targets::TargetManager;

/// Who is asking for a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    /// Authenticated user; must own the stream's project
    User(Uuid),
    /// Verified provider callback; may only activate or suspend
    ProviderWebhook,
    /// Background reconciliation
    System,
}

/// Provider callback events that drive a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderEvent {
    Started,
    Idle,
}

impl ProviderEvent {
    pub fn parse(event: &str) -> Option<Self> {
        match event {
            "stream.started" => Some(ProviderEvent::Started),
            "stream.idle" => Some(ProviderEvent::Idle),
            _ => None,
        }
    }

    fn operation(&self) -> IntentOperation {
        match self {
            ProviderEvent::Started => IntentOperation::Activate,
            ProviderEvent::Idle => IntentOperation::Suspend,
        }
    }
}

/// Result of applying a provider callback. Everything except a hard failure
/// is acknowledged to the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Applied(StreamStatus),
    UnknownStream,
    AlreadyApplied(StreamStatus),
}

pub struct LifecycleService {
    store: Arc<dyn StreamStore>,
    provider: Arc<dyn MediaProvider>,
    projects: Arc<dyn ProjectDirectory>,
    targets: TargetManager,
    playback_webhook_id: Option<String>,
}

fn outcome_label(err: &AppError) -> &'static str {
    match err {
        AppError::Validation(_) | AppError::Credential(_) => "rejected",
        AppError::Unauthorized(_) | AppError::Forbidden(_) | AppError::Signature(_) => "forbidden",
        AppError::NotFound(_) => "not_found",
        AppError::InvalidState { .. } => "invalid_state",
        AppError::Conflict(_) => "conflict",
        AppError::Provider(_) => "provider_error",
        AppError::Database(_) | AppError::Internal(_) => "error",
    }
}

impl LifecycleService {
    pub fn new(
        store: Arc<dyn StreamStore>,
        provider: Arc<dyn MediaProvider>,
        projects: Arc<dyn ProjectDirectory>,
        credentials: Arc<dyn CredentialDirectory>,
        playback_webhook_id: Option<String>,
    ) -> Self {
        Self {
            store,
            provider,
            projects,
            targets: TargetManager::new(credentials),
            playback_webhook_id,
        }
    }

    pub fn store(&self) -> &Arc<dyn StreamStore> {
        &self.store
    }

    fn playback_policy(&self, visibility: bool, project_id: Uuid) -> Result<PlaybackPolicy> {
        if visibility {
            return Ok(PlaybackPolicy::Public);
        }
        let webhook_id = self.playback_webhook_id.clone().ok_or_else(|| {
            AppError::Validation(
                "private playback is not available: no playback webhook is configured".to_string(),
            )
        })?;
        Ok(PlaybackPolicy::Webhook {
            webhook_id,
            webhook_context: json!({ "projectId": project_id }),
        })
    }

    async fn owned_project(&self, user_id: Uuid, project_id: Uuid) -> Result<Project> {
        let project = self.projects.require_project(project_id).await?;
        if !project.is_owner(user_id) {
            return Err(AppError::Forbidden(
                "only the project owner can manage its streams".to_string(),
            ));
        }
        Ok(project)
    }

    async fn authorize(&self, actor: Actor, stream: &Stream, transition: Transition) -> Result<()> {
        match actor {
            Actor::System => Ok(()),
            Actor::ProviderWebhook => match transition {
                Transition::Activate | Transition::Suspend => Ok(()),
                other => Err(AppError::Forbidden(format!(
                    "provider callbacks cannot {other} a stream"
                ))),
            },
            Actor::User(user_id) => self.owned_project(user_id, stream.project_id).await.map(|_| ()),
        }
    }

    async fn resolve(&self, intent: &StreamIntent, outcome: IntentOutcome, error: Option<&str>) {
        match self.store.resolve_intent(intent.id, outcome, error).await {
            Ok(()) => metrics::record_intent_resolved(intent.operation.name(), outcome.as_str()),
            Err(e) => warn!(
                intent_id = %intent.id,
                outcome = outcome.as_str(),
                error = %e,
                "Failed to resolve intent; the reconciler will pick it up"
            ),
        }
    }

    async fn note_failure(&self, intent: &StreamIntent, err: &AppError) {
        if let Err(e) = self.store.record_intent_failure(intent.id, &err.to_string()).await {
            warn!(intent_id = %intent.id, error = %e, "Failed to record intent failure");
        }
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    #[tracing::instrument(skip(self, request))]
    pub async fn create_stream(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        request: CreateStreamRequest,
    ) -> Result<Stream> {
        let result = self.create_inner(user_id, project_id, request).await;
        match &result {
            Ok(stream) => {
                metrics::record_transition("create", "success");
                info!(stream_id = %stream.id, remote_id = %stream.remote_id, "Stream created");
            }
            Err(e) => metrics::record_transition("create", outcome_label(e)),
        }
        result
    }

    async fn create_inner(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        request: CreateStreamRequest,
    ) -> Result<Stream> {
        request.validate()?;
        let project = self.owned_project(user_id, project_id).await?;

        let stream_id = Uuid::new_v4();
        let targets = self
            .targets
            .validate_targets(&project, stream_id, &request.platforms, &request.profiles)
            .await?;
        let playback_policy = self.playback_policy(request.visibility, project_id)?;

        let mut tx = self.store.begin().await?;

        let intent = StreamIntent::new(stream_id, IntentOperation::Create, None);
        self.store.record_intent(&intent).await?;

        let remote = match self
            .provider
            .create_stream(&CreateRemoteStream {
                name: request.title.clone(),
                profiles: request.profiles.clone(),
                playback_policy,
                targets: targets.clone(),
            })
            .await
        {
            Ok(remote) => remote,
            Err(e) => {
                self.resolve(&intent, IntentOutcome::Aborted, Some(&e.to_string()))
                    .await;
                return Err(e.into());
            }
        };

        if let Err(e) = self
            .store
            .set_intent_remote_id(intent.id, &remote.remote_id)
            .await
        {
            warn!(intent_id = %intent.id, error = %e, "Failed to record remote id on intent");
        }

        let now = Utc::now();
        let stream = Stream {
            id: stream_id,
            project_id,
            remote_id: remote.remote_id,
            playback_id: remote.playback_id,
            stream_key: remote.stream_key,
            title: request.title,
            description: request.description,
            visibility: request.visibility,
            profiles: request.profiles,
            status: StreamStatus::Created,
            schedule_date: request.schedule_date,
            targets,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let persisted = async {
            tx.insert_stream(&stream).await?;
            for target in &stream.targets {
                tx.insert_target(target).await?;
            }
            tx.commit().await
        }
        .await;

        match persisted {
            Ok(()) => {
                self.resolve(&intent, IntentOutcome::Completed, None).await;
                Ok(stream)
            }
            Err(e) => {
                error!(
                    stream_id = %stream.id,
                    remote_id = %stream.remote_id,
                    error = %e,
                    "Persisting new stream failed; deleting remote stream"
                );
                self.compensate_create(&intent, &stream.remote_id, &e).await;
                Err(e)
            }
        }
    }

    async fn compensate_create(&self, intent: &StreamIntent, remote_id: &str, cause: &AppError) {
        match self.provider.delete_stream(remote_id).await {
            Ok(_) => {
                self.resolve(intent, IntentOutcome::Compensated, Some(&cause.to_string()))
                    .await
            }
            Err(e) => {
                warn!(
                    remote_id,
                    error = %e,
                    "Compensating delete failed; leaving intent for the reconciler"
                );
                self.note_failure(intent, cause).await;
            }
        }
    }

    /// Remove a remote stream that has no local record.
    pub async fn discard_remote(&self, remote_id: &str) -> Result<()> {
        self.provider.delete_stream(remote_id).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Single view of a stream. The ingest key is included for the project
    /// owner only.
    pub async fn get_stream(&self, user_id: Uuid, stream_id: Uuid) -> Result<StreamSingleView> {
        let stream = self
            .store
            .find_stream(stream_id)
            .await?
            .filter(|s| s.status != StreamStatus::Deleted)
            .ok_or_else(|| AppError::NotFound(format!("Stream {stream_id}")))?;

        let is_owner = self
            .projects
            .find_project(stream.project_id)
            .await?
            .is_some_and(|p| p.is_owner(user_id));

        Ok(stream.single_view(is_owner))
    }

    pub async fn list_streams(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        page: Page,
    ) -> Result<(Vec<StreamListView>, PageMeta)> {
        let project = self.projects.require_project(project_id).await?;
        if !project.is_member(user_id) {
            return Err(AppError::Forbidden(
                "only project members can list its streams".to_string(),
            ));
        }

        let (streams, total) = self.store.list_by_project(project_id, page).await?;
        debug!(project_id = %project_id, total, "Listed streams");
        Ok((
            streams.iter().map(Stream::list_view).collect(),
            PageMeta::new(page, total),
        ))
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    pub async fn activate_stream(&self, actor: Actor, stream_id: Uuid) -> Result<Stream> {
        self.run_transition(actor, stream_id, IntentOperation::Activate)
            .await
    }

    pub async fn suspend_stream(&self, actor: Actor, stream_id: Uuid) -> Result<Stream> {
        self.run_transition(actor, stream_id, IntentOperation::Suspend)
            .await
    }

    pub async fn terminate_stream(&self, actor: Actor, stream_id: Uuid) -> Result<Stream> {
        self.run_transition(actor, stream_id, IntentOperation::Terminate)
            .await
    }

    pub async fn delete_stream(&self, actor: Actor, stream_id: Uuid) -> Result<Stream> {
        self.run_transition(actor, stream_id, IntentOperation::Delete)
            .await
    }

    pub async fn update_stream(
        &self,
        actor: Actor,
        stream_id: Uuid,
        changes: StreamChanges,
    ) -> Result<Stream> {
        changes.validate()?;
        if changes.is_empty() {
            return Err(AppError::Validation("no changes supplied".to_string()));
        }
        self.run_transition(actor, stream_id, IntentOperation::Update { changes })
            .await
    }

    #[tracing::instrument(skip(self, request), fields(platform = %request.platform))]
    pub async fn attach_target(
        &self,
        user_id: Uuid,
        stream_id: Uuid,
        request: TargetRequest,
    ) -> Result<Stream> {
        request.validate()?;
        let result = self.attach_inner(user_id, stream_id, &request).await;
        self.observe(Transition::AttachTarget, stream_id, &result);
        result
    }

    async fn attach_inner(&self, user_id: Uuid, stream_id: Uuid, request: &TargetRequest) -> Result<Stream> {
        let mut tx = self.store.begin().await?;
        let stream = tx
            .lock_stream(stream_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Stream {stream_id}")))?;

        if !Transition::AttachTarget.is_allowed_from(stream.status) {
            return Err(AppError::InvalidState {
                transition: Transition::AttachTarget,
                status: stream.status,
            });
        }
        let project = self.owned_project(user_id, stream.project_id).await?;
        let target = self
            .targets
            .validate_attachment(&project, &stream, request)
            .await?;

        self.execute(tx, stream, IntentOperation::AttachTarget { target }, true)
            .await
    }

    /// Re-run an unresolved intent as the system actor. Intent bookkeeping is
    /// left to the caller.
    pub async fn replay(&self, intent: &StreamIntent) -> Result<Stream> {
        let transition = intent.operation.transition().ok_or_else(|| {
            AppError::Internal("create intents are reconciled, not replayed".to_string())
        })?;

        let mut tx = self.store.begin().await?;
        let stream = tx
            .lock_stream(intent.stream_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Stream {}", intent.stream_id)))?;
        if !transition.is_allowed_from(stream.status) {
            return Err(AppError::InvalidState {
                transition,
                status: stream.status,
            });
        }

        let result = self.execute(tx, stream, intent.operation.clone(), false).await;
        self.observe(transition, intent.stream_id, &result);
        result
    }

    /// Apply a verified provider callback to the stream it names.
    #[tracing::instrument(skip(self))]
    pub async fn apply_provider_event(&self, event: ProviderEvent, remote_id: &str) -> Result<EventOutcome> {
        let Some(stream) = self.store.find_by_remote_id(remote_id).await? else {
            debug!("Ignoring event for unknown remote stream");
            return Ok(EventOutcome::UnknownStream);
        };

        match self
            .run_transition(Actor::ProviderWebhook, stream.id, event.operation())
            .await
        {
            Ok(updated) => Ok(EventOutcome::Applied(updated.status)),
            Err(AppError::InvalidState { status, .. }) => {
                debug!(stream_id = %stream.id, %status, "Event does not apply in current state");
                Ok(EventOutcome::AlreadyApplied(status))
            }
            Err(e) => Err(e),
        }
    }

    #[tracing::instrument(skip(self, operation), fields(operation = operation.name()))]
    async fn run_transition(
        &self,
        actor: Actor,
        stream_id: Uuid,
        operation: IntentOperation,
    ) -> Result<Stream> {
        let transition = operation.transition().ok_or_else(|| {
            AppError::Internal("create is not a transition of an existing stream".to_string())
        })?;

        let result = async {
            let mut tx = self.store.begin().await?;
            let stream = tx
                .lock_stream(stream_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Stream {stream_id}")))?;

            if !transition.is_allowed_from(stream.status) {
                return Err(AppError::InvalidState {
                    transition,
                    status: stream.status,
                });
            }
            self.authorize(actor, &stream, transition).await?;

            self.execute(tx, stream, operation, true).await
        }
        .await;

        self.observe(transition, stream_id, &result);
        result
    }

    fn observe(&self, transition: Transition, stream_id: Uuid, result: &Result<Stream>) {
        match result {
            Ok(stream) => {
                metrics::record_transition(transition.as_str(), "success");
                info!(
                    stream_id = %stream_id,
                    transition = transition.as_str(),
                    status = %stream.status,
                    version = stream.version,
                    "Stream transition applied"
                );
            }
            Err(e) => {
                metrics::record_transition(transition.as_str(), outcome_label(e));
                debug!(
                    stream_id = %stream_id,
                    transition = transition.as_str(),
                    error = %e,
                    "Stream transition refused"
                );
            }
        }
    }

    /// Provider call and persistence for a locked, authorized stream.
    async fn execute(
        &self,
        mut tx: Box<dyn StreamTransaction>,
        stream: Stream,
        operation: IntentOperation,
        track_intent: bool,
    ) -> Result<Stream> {
        let intent = StreamIntent::new(stream.id, operation.clone(), Some(stream.remote_id.clone()));
        if track_intent {
            self.store.record_intent(&intent).await?;
        }

        if let Err(e) = self.call_provider(&stream, &operation).await {
            if track_intent {
                self.resolve(&intent, IntentOutcome::Aborted, Some(&e.to_string()))
                    .await;
            }
            return Err(e);
        }

        let mut updated = apply_operation(&stream, &operation);
        let persisted = async {
            updated.version = tx.update_stream(&updated).await?;
            if let IntentOperation::AttachTarget { target } = &operation {
                tx.insert_target(target).await?;
            }
            tx.commit().await
        }
        .await;

        match persisted {
            Ok(()) => {
                if track_intent {
                    self.resolve(&intent, IntentOutcome::Completed, None).await;
                }
                Ok(updated)
            }
            Err(e) => {
                error!(
                    stream_id = %stream.id,
                    operation = operation.name(),
                    error = %e,
                    "Provider accepted the change but persisting it failed"
                );
                if track_intent {
                    self.note_failure(&intent, &e).await;
                }
                Err(e)
            }
        }
    }

    async fn call_provider(&self, stream: &Stream, operation: &IntentOperation) -> Result<()> {
        let remote_id = stream.remote_id.as_str();
        let exists = match operation {
            IntentOperation::Create => {
                return Err(AppError::Internal("create has its own flow".to_string()))
            }
            IntentOperation::Activate => self.provider.activate_stream(remote_id).await?,
            IntentOperation::Suspend => self.provider.suspend_stream(remote_id).await?,
            IntentOperation::Terminate => self.provider.terminate_stream(remote_id).await?,
            IntentOperation::Delete => {
                if !self.provider.delete_stream(remote_id).await? {
                    debug!(remote_id, "Remote stream already gone");
                }
                true
            }
            IntentOperation::Update { changes } => self.push_changes(stream, changes).await?,
            IntentOperation::AttachTarget { target } => {
                self.provider
                    .attach_multistream_target(remote_id, target)
                    .await?
            }
        };

        if exists {
            Ok(())
        } else {
            Err(ProviderError::RemoteMissing(remote_id.to_string()).into())
        }
    }

    async fn push_changes(&self, stream: &Stream, changes: &StreamChanges) -> Result<bool> {
        let remote_id = stream.remote_id.as_str();

        // Local-only edits still confirm the remote stream exists.
        if changes.profiles.is_none() && !changes.touches_remote_metadata(stream) {
            return Ok(self
                .provider
                .update_stream(remote_id, &RemoteStreamPatch::default())
                .await?);
        }

        let patch = RemoteStreamPatch {
            name: changes.title.clone().filter(|t| *t != stream.title),
            playback_policy: match changes.visibility {
                Some(v) if v != stream.visibility => Some(self.playback_policy(v, stream.project_id)?),
                _ => None,
            },
        };

        if let Some(incoming) = &changes.profiles {
            let ladder = crate::models::merge_profiles(&stream.profiles, incoming);
            if !self.provider.update_stream_profiles(remote_id, &ladder).await? {
                return Ok(false);
            }
        }
        if !patch.is_empty() && !self.provider.update_stream(remote_id, &patch).await? {
            return Ok(false);
        }
        Ok(true)
    }
}

/// The stream as it looks once `operation` has been applied.
pub fn apply_operation(stream: &Stream, operation: &IntentOperation) -> Stream {
    let mut updated = stream.clone();
    match operation {
        IntentOperation::Update { changes } => changes.apply_to(&mut updated),
        IntentOperation::AttachTarget { target } => updated.targets.push(target.clone()),
        _ => {}
    }
    if let Some(transition) = operation.transition() {
        updated.status = transition.resulting_status(stream.status);
    }
    updated.updated_at = Utc::now();
    updated
}

/// Whether the stored stream already reflects `operation`.
pub fn is_reflected(stream: &Stream, operation: &IntentOperation) -> bool {
    match operation {
        IntentOperation::Create => true,
        IntentOperation::Activate => stream.status == StreamStatus::Active,
        IntentOperation::Suspend => stream.status == StreamStatus::Suspended,
        IntentOperation::Terminate => stream.status == StreamStatus::Terminated,
        IntentOperation::Delete => stream.status == StreamStatus::Deleted,
        IntentOperation::Update { changes } => {
            let mut applied = stream.clone();
            changes.apply_to(&mut applied);
            applied.title == stream.title
                && applied.description == stream.description
                && applied.visibility == stream.visibility
                && applied.schedule_date == stream.schedule_date
                && applied.profiles == stream.profiles
        }
        IntentOperation::AttachTarget { target } => stream.has_platform(target.platform),
    }
}
