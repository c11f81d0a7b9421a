mod common;

use uuid::Uuid;

use common::{create_request, target, test_env, TestEnv};
use stream_service::db::StreamStore;
use stream_service::error::AppError;
use stream_service::models::{
    IntentOperation, IntentOutcome, Page, Platform, Stream, StreamChanges, StreamStatus,
    Transition,
};
use stream_service::services::{Actor, EventOutcome, ProviderEvent};

#[tokio::test]
async fn create_activate_terminate_then_activate_is_refused() {
    let env = test_env().await;
    let mut request = create_request("Launch day");
    request.platforms = vec![target(Platform::Twitch)];

    let stream = env
        .lifecycle
        .create_stream(env.owner, env.project_id, request)
        .await
        .expect("create");
    assert_eq!(stream.status, StreamStatus::Created);
    assert_eq!(stream.targets.len(), 1);
    assert_eq!(stream.targets[0].ingest.stream_key, "live_123");
    assert!(env.provider.has_remote(&stream.remote_id));

    let active = env
        .lifecycle
        .activate_stream(Actor::User(env.owner), stream.id)
        .await
        .expect("activate");
    assert_eq!(active.status, StreamStatus::Active);

    let terminated = env
        .lifecycle
        .terminate_stream(Actor::User(env.owner), stream.id)
        .await
        .expect("terminate");
    assert_eq!(terminated.status, StreamStatus::Terminated);
    assert_eq!(terminated.version, 3);

    let err = env
        .lifecycle
        .activate_stream(Actor::User(env.owner), stream.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InvalidState {
            transition: Transition::Activate,
            status: StreamStatus::Terminated
        }
    ));
    assert_eq!(env.provider.calls("activate"), 1);

    let stored = env.store.find_stream(stream.id).await.unwrap().unwrap();
    assert_eq!(stored.status, StreamStatus::Terminated);
}

#[tokio::test]
async fn unlinked_platform_rejects_the_whole_create() {
    let env = test_env().await;
    let mut request = create_request("Fan out");
    request.platforms = vec![target(Platform::Twitch), target(Platform::YouTube)];

    let err = env
        .lifecycle
        .create_stream(env.owner, env.project_id, request)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Credential(Platform::YouTube)));
    assert_eq!(env.provider.calls("create"), 0);
    let (streams, total) = env
        .store
        .list_by_project(env.project_id, Page::default())
        .await
        .unwrap();
    assert!(streams.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn peers_cannot_create_or_transition() {
    let env = test_env().await;

    let err = env
        .lifecycle
        .create_stream(env.peer, env.project_id, create_request("Not mine"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let stream = env
        .lifecycle
        .create_stream(env.owner, env.project_id, create_request("Mine"))
        .await
        .unwrap();
    let err = env
        .lifecycle
        .activate_stream(Actor::User(env.peer), stream.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    assert_eq!(env.provider.calls("activate"), 0);

    // Peers may still read and list.
    let view = env.lifecycle.get_stream(env.peer, stream.id).await.unwrap();
    assert!(view.stream_key.is_none());
    let (items, meta) = env
        .lifecycle
        .list_streams(env.peer, env.project_id, Page::default())
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(meta.total, 1);
}

#[tokio::test]
async fn failed_commit_leaves_stream_untouched_and_intent_open() {
    let env = test_env().await;
    let stream = env
        .lifecycle
        .create_stream(env.owner, env.project_id, create_request("Flaky db"))
        .await
        .unwrap();

    env.store.fail_next_commit();
    let err = env
        .lifecycle
        .activate_stream(Actor::User(env.owner), stream.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Database(_)));

    let stored = env.store.find_stream(stream.id).await.unwrap().unwrap();
    assert_eq!(stored.status, StreamStatus::Created);
    assert_eq!(stored.version, 1);

    let open: Vec<_> = env
        .store
        .intents()
        .await
        .into_iter()
        .filter(|i| !i.is_resolved())
        .collect();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].operation, IntentOperation::Activate);
    assert_eq!(open[0].attempts, 1);
}

#[tokio::test]
async fn failed_create_commit_deletes_the_remote_stream() {
    let env = test_env().await;
    env.store.fail_next_commit();

    let err = env
        .lifecycle
        .create_stream(env.owner, env.project_id, create_request("Rolled back"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Database(_)));
    assert_eq!(env.provider.calls("create"), 1);
    assert_eq!(env.provider.calls("delete"), 1);
    assert!(!env.provider.has_remote("remote-0"));

    let intents = env.store.intents().await;
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].outcome, Some(IntentOutcome::Compensated));
}

#[tokio::test]
async fn provider_failure_aborts_without_local_change() {
    let env = test_env().await;
    let stream = env
        .lifecycle
        .create_stream(env.owner, env.project_id, create_request("Provider down"))
        .await
        .unwrap();

    env.provider.set_fail_transitions(true);
    let err = env
        .lifecycle
        .activate_stream(Actor::User(env.owner), stream.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Provider(_)));

    let stored = env.store.find_stream(stream.id).await.unwrap().unwrap();
    assert_eq!(stored.status, StreamStatus::Created);
    let activate_intent = env
        .store
        .intents()
        .await
        .into_iter()
        .find(|i| i.operation == IntentOperation::Activate)
        .unwrap();
    assert_eq!(activate_intent.outcome, Some(IntentOutcome::Aborted));
}

#[tokio::test]
async fn repeated_provider_events_apply_once() {
    let env = test_env().await;
    let stream = env
        .lifecycle
        .create_stream(env.owner, env.project_id, create_request("Webhooks"))
        .await
        .unwrap();

    let first = env
        .lifecycle
        .apply_provider_event(ProviderEvent::Started, &stream.remote_id)
        .await
        .unwrap();
    assert_eq!(first, EventOutcome::Applied(StreamStatus::Active));

    let idle = env
        .lifecycle
        .apply_provider_event(ProviderEvent::Idle, &stream.remote_id)
        .await
        .unwrap();
    assert_eq!(idle, EventOutcome::Applied(StreamStatus::Suspended));

    let replayed = env
        .lifecycle
        .apply_provider_event(ProviderEvent::Idle, &stream.remote_id)
        .await
        .unwrap();
    assert_eq!(replayed, EventOutcome::AlreadyApplied(StreamStatus::Suspended));
    assert_eq!(env.provider.calls("suspend"), 1);

    let unknown = env
        .lifecycle
        .apply_provider_event(ProviderEvent::Started, "remote-unknown")
        .await
        .unwrap();
    assert_eq!(unknown, EventOutcome::UnknownStream);
}

#[tokio::test]
async fn webhook_actor_cannot_terminate() {
    let env = test_env().await;
    let stream = env
        .lifecycle
        .create_stream(env.owner, env.project_id, create_request("Guarded"))
        .await
        .unwrap();
    env.lifecycle
        .activate_stream(Actor::User(env.owner), stream.id)
        .await
        .unwrap();

    let err = env
        .lifecycle
        .terminate_stream(Actor::ProviderWebhook, stream.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    assert_eq!(env.provider.calls("terminate"), 0);
}

#[tokio::test]
async fn update_merges_profiles_and_bumps_version() {
    let env = test_env().await;
    let stream = env
        .lifecycle
        .create_stream(env.owner, env.project_id, create_request("Ladder"))
        .await
        .unwrap();

    let changes: StreamChanges = serde_json::from_value(serde_json::json!({
        "title": "Ladder v2",
        "profiles": [{"name": "720p", "bitrate": 3000000, "fps": 30, "width": 1280, "height": 720}]
    }))
    .unwrap();

    let updated = env
        .lifecycle
        .update_stream(Actor::User(env.owner), stream.id, changes)
        .await
        .unwrap();
    assert_eq!(updated.title, "Ladder v2");
    assert_eq!(updated.profiles.len(), 1);
    assert_eq!(updated.version, 2);
    assert_eq!(env.provider.calls("update_profiles"), 1);
    assert_eq!(env.provider.calls("update"), 1);

    let err = env
        .lifecycle
        .update_stream(Actor::User(env.owner), stream.id, StreamChanges::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn attach_rejects_duplicate_platform() {
    let env = test_env().await;
    let stream = env
        .lifecycle
        .create_stream(env.owner, env.project_id, create_request("Attach"))
        .await
        .unwrap();

    let attached = env
        .lifecycle
        .attach_target(env.owner, stream.id, target(Platform::Twitch))
        .await
        .unwrap();
    assert!(attached.has_platform(Platform::Twitch));

    let err = env
        .lifecycle
        .attach_target(env.owner, stream.id, target(Platform::Twitch))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(env.provider.calls("attach_target"), 1);

    let stored = env.store.find_stream(stream.id).await.unwrap().unwrap();
    assert_eq!(stored.targets.len(), 1);
}

#[tokio::test]
async fn deleted_streams_disappear_from_reads() {
    let env = test_env().await;
    let stream = env
        .lifecycle
        .create_stream(env.owner, env.project_id, create_request("Gone"))
        .await
        .unwrap();

    env.lifecycle
        .delete_stream(Actor::User(env.owner), stream.id)
        .await
        .unwrap();
    assert!(!env.provider.has_remote(&stream.remote_id));

    let err = env.lifecycle.get_stream(env.owner, stream.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let (items, _) = env
        .lifecycle
        .list_streams(env.owner, env.project_id, Page::default())
        .await
        .unwrap();
    assert!(items.is_empty());
}

/// Create a stream and drive it into `status` through the service.
async fn stream_in(env: &TestEnv, status: StreamStatus) -> Uuid {
    let owner = Actor::User(env.owner);
    let id = env
        .lifecycle
        .create_stream(env.owner, env.project_id, create_request("Fixture"))
        .await
        .unwrap()
        .id;
    let svc = &env.lifecycle;
    match status {
        StreamStatus::Created => {}
        StreamStatus::Active => {
            svc.activate_stream(owner, id).await.unwrap();
        }
        StreamStatus::Suspended => {
            svc.activate_stream(owner, id).await.unwrap();
            svc.suspend_stream(owner, id).await.unwrap();
        }
        StreamStatus::Terminated => {
            svc.activate_stream(owner, id).await.unwrap();
            svc.terminate_stream(owner, id).await.unwrap();
        }
        StreamStatus::Deleted => {
            svc.delete_stream(owner, id).await.unwrap();
        }
    }
    id
}

async fn attempt(env: &TestEnv, transition: Transition, id: Uuid) -> Result<Stream, AppError> {
    let owner = Actor::User(env.owner);
    let svc = &env.lifecycle;
    match transition {
        Transition::Activate => svc.activate_stream(owner, id).await,
        Transition::Suspend => svc.suspend_stream(owner, id).await,
        Transition::Terminate => svc.terminate_stream(owner, id).await,
        Transition::Delete => svc.delete_stream(owner, id).await,
        Transition::Update => {
            let changes = StreamChanges {
                title: Some("Renamed".into()),
                ..Default::default()
            };
            svc.update_stream(owner, id, changes).await
        }
        Transition::AttachTarget => svc.attach_target(env.owner, id, target(Platform::Twitch)).await,
    }
}

#[tokio::test]
async fn every_forbidden_transition_is_refused_without_side_effects() {
    let env = test_env().await;
    let mut checked = 0;

    for status in StreamStatus::ALL {
        let id = stream_in(&env, status).await;

        for transition in Transition::ALL {
            if transition.is_allowed_from(status) {
                continue;
            }
            let before = env.store.find_stream(id).await.unwrap().unwrap();
            let calls_before = env.provider.total_calls();
            let intents_before = env.store.intents().await.len();

            match attempt(&env, transition, id).await {
                Err(AppError::InvalidState {
                    transition: refused,
                    status: current,
                }) => {
                    assert_eq!(refused, transition);
                    assert_eq!(current, status);
                }
                other => panic!("{transition:?} from {status:?} should be refused, got {other:?}"),
            }

            let after = env.store.find_stream(id).await.unwrap().unwrap();
            assert_eq!(after, before, "{transition:?} from {status:?} changed the record");
            assert_eq!(env.provider.total_calls(), calls_before);
            assert_eq!(env.store.intents().await.len(), intents_before);
            checked += 1;
        }
    }

    // Created 2, Active 1, Suspended 1, Terminated 5, Deleted 6
    assert_eq!(checked, 15);
}
