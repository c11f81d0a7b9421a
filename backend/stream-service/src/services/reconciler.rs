//! Background reconciliation of unresolved intents
//!
//! A provider call and the local commit that follows it are not atomic. An
//! intent left unresolved means the process failed somewhere in between, so
//! the worker decides from the stored stream which side is behind:
//!
//! - create: local row exists → completed; remote id known → delete the
//!   orphaned remote stream (compensated); otherwise abandoned
//! - transitions: already reflected → completed; stream gone → abandoned;
//!   untouched since the intent and still legal → replay (completed);
//!   otherwise superseded

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ReconcilerConfig;
use crate::db::StreamStore;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{IntentOperation, IntentOutcome, StreamIntent};
use crate::services::lifecycle::{is_reflected, LifecycleService};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub completed: usize,
    pub compensated: usize,
    pub superseded: usize,
    pub abandoned: usize,
    pub failed: usize,
}

impl ReconcileReport {
    fn count(&mut self, outcome: IntentOutcome) {
        match outcome {
            IntentOutcome::Completed => self.completed += 1,
            IntentOutcome::Compensated => self.compensated += 1,
            IntentOutcome::Superseded => self.superseded += 1,
            IntentOutcome::Abandoned | IntentOutcome::Aborted => self.abandoned += 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub struct Reconciler {
    store: Arc<dyn StreamStore>,
    lifecycle: Arc<LifecycleService>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(lifecycle: Arc<LifecycleService>, config: ReconcilerConfig) -> Self {
        Self {
            store: lifecycle.store().clone(),
            lifecycle,
            config,
        }
    }

    /// Poll on the configured interval until `shutdown` flips to true.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.config.interval_secs,
                stale_after_secs = self.config.stale_after_secs,
                "Intent reconciler started"
            );
            let mut interval =
                tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("Intent reconciler stopping");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match self.run_once().await {
                            Ok(report) if !report.is_empty() => info!(?report, "Reconciliation pass finished"),
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Reconciliation pass failed, will retry next interval"),
                        }
                    }
                }
            }
        })
    }

    pub async fn run_once(&self) -> Result<ReconcileReport> {
        let older_than = Utc::now() - ChronoDuration::seconds(self.config.stale_after_secs);
        let intents = self
            .store
            .stale_intents(older_than, self.config.max_attempts, self.config.batch_size)
            .await?;

        let mut report = ReconcileReport::default();
        for intent in intents {
            match self.reconcile(&intent).await {
                Ok(outcome) => {
                    self.store.resolve_intent(intent.id, outcome, None).await?;
                    metrics::record_intent_resolved(intent.operation.name(), outcome.as_str());
                    debug!(
                        intent_id = %intent.id,
                        stream_id = %intent.stream_id,
                        operation = intent.operation.name(),
                        outcome = outcome.as_str(),
                        "Intent resolved"
                    );
                    report.count(outcome);
                }
                Err(e) => {
                    report.failed += 1;
                    self.store
                        .record_intent_failure(intent.id, &e.to_string())
                        .await?;
                    if intent.attempts + 1 >= self.config.max_attempts {
                        warn!(
                            intent_id = %intent.id,
                            stream_id = %intent.stream_id,
                            operation = intent.operation.name(),
                            error = %e,
                            "Intent reached the attempt ceiling; manual review needed"
                        );
                    } else {
                        debug!(intent_id = %intent.id, error = %e, "Reconciliation attempt failed");
                    }
                }
            }
        }
        Ok(report)
    }

    async fn reconcile(&self, intent: &StreamIntent) -> Result<IntentOutcome> {
        let stream = self.store.find_stream(intent.stream_id).await?;

        if matches!(intent.operation, IntentOperation::Create) {
            return match (stream, intent.remote_id.as_deref()) {
                (Some(_), _) => Ok(IntentOutcome::Completed),
                (None, Some(remote_id)) => {
                    self.lifecycle.discard_remote(remote_id).await?;
                    info!(remote_id, "Deleted orphaned remote stream");
                    Ok(IntentOutcome::Compensated)
                }
                (None, None) => Ok(IntentOutcome::Abandoned),
            };
        }

        let Some(stream) = stream else {
            return Ok(IntentOutcome::Abandoned);
        };
        if is_reflected(&stream, &intent.operation) {
            return Ok(IntentOutcome::Completed);
        }
        if stream.updated_at > intent.created_at {
            return Ok(IntentOutcome::Superseded);
        }

        match self.lifecycle.replay(intent).await {
            Ok(_) => Ok(IntentOutcome::Completed),
            Err(AppError::InvalidState { .. }) | Err(AppError::NotFound(_)) => {
                Ok(IntentOutcome::Superseded)
            }
            Err(e) => Err(e),
        }
    }
}
