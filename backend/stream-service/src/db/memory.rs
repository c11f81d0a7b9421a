//! In-memory persistence for development and tests
//!
//! Transactions are serialized by a single writer lock held until commit or
//! drop. Writes are staged in the transaction and applied on commit only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{StreamStore, StreamTransaction};
use crate::error::{AppError, Result};
use crate::models::{IntentOutcome, MultistreamTarget, Page, Stream, StreamIntent, StreamStatus};

#[derive(Clone, Default)]
pub struct MemoryStore {
    streams: Arc<RwLock<HashMap<Uuid, Stream>>>,
    intents: Arc<Mutex<HashMap<Uuid, StreamIntent>>>,
    writer: Arc<Mutex<()>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with a database error.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    pub async fn intents(&self) -> Vec<StreamIntent> {
        let mut intents: Vec<_> = self.intents.lock().await.values().cloned().collect();
        intents.sort_by_key(|i| i.created_at);
        intents
    }

    async fn update_intent<F>(&self, intent_id: Uuid, f: F) -> Result<()>
    where
        F: FnOnce(&mut StreamIntent),
    {
        let mut intents = self.intents.lock().await;
        let intent = intents
            .get_mut(&intent_id)
            .ok_or_else(|| AppError::NotFound(format!("Intent {intent_id}")))?;
        f(intent);
        Ok(())
    }
}

#[async_trait]
impl StreamStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StreamTransaction>> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            _guard: guard,
            streams: self.streams.clone(),
            staged: HashMap::new(),
            fail_commit: self.fail_next_commit.swap(false, Ordering::SeqCst),
        }))
    }

    async fn find_stream(&self, id: Uuid) -> Result<Option<Stream>> {
        Ok(self.streams.read().await.get(&id).cloned())
    }

    async fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<Stream>> {
        Ok(self
            .streams
            .read()
            .await
            .values()
            .find(|s| s.remote_id == remote_id)
            .cloned())
    }

    async fn list_by_project(&self, project_id: Uuid, page: Page) -> Result<(Vec<Stream>, i64)> {
        let streams = self.streams.read().await;
        let mut matching: Vec<&Stream> = streams
            .values()
            .filter(|s| s.project_id == project_id && s.status != StreamStatus::Deleted)
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .map(|s| Stream {
                targets: Vec::new(),
                ..s.clone()
            })
            .collect();
        Ok((items, total))
    }

    async fn record_intent(&self, intent: &StreamIntent) -> Result<()> {
        self.intents.lock().await.insert(intent.id, intent.clone());
        Ok(())
    }

    async fn set_intent_remote_id(&self, intent_id: Uuid, remote_id: &str) -> Result<()> {
        self.update_intent(intent_id, |i| i.remote_id = Some(remote_id.to_string()))
            .await
    }

    async fn resolve_intent(
        &self,
        intent_id: Uuid,
        outcome: IntentOutcome,
        error: Option<&str>,
    ) -> Result<()> {
        self.update_intent(intent_id, |i| {
            if i.resolved_at.is_none() {
                i.resolved_at = Some(Utc::now());
                i.outcome = Some(outcome);
                if let Some(error) = error {
                    i.last_error = Some(error.to_string());
                }
            }
        })
        .await
    }

    async fn record_intent_failure(&self, intent_id: Uuid, error: &str) -> Result<()> {
        self.update_intent(intent_id, |i| {
            i.attempts += 1;
            i.last_error = Some(error.to_string());
        })
        .await
    }

    async fn stale_intents(
        &self,
        older_than: DateTime<Utc>,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<StreamIntent>> {
        let intents = self.intents.lock().await;
        let mut stale: Vec<StreamIntent> = intents
            .values()
            .filter(|i| !i.is_resolved() && i.created_at < older_than && i.attempts < max_attempts)
            .cloned()
            .collect();
        stale.sort_by_key(|i| i.created_at);
        stale.truncate(limit.max(0) as usize);
        Ok(stale)
    }

    async fn find_intent(&self, intent_id: Uuid) -> Result<Option<StreamIntent>> {
        Ok(self.intents.lock().await.get(&intent_id).cloned())
    }
}

pub struct MemoryTransaction {
    _guard: OwnedMutexGuard<()>,
    streams: Arc<RwLock<HashMap<Uuid, Stream>>>,
    staged: HashMap<Uuid, Stream>,
    fail_commit: bool,
}

impl MemoryTransaction {
    async fn current(&self, id: Uuid) -> Option<Stream> {
        match self.staged.get(&id) {
            Some(stream) => Some(stream.clone()),
            None => self.streams.read().await.get(&id).cloned(),
        }
    }
}

#[async_trait]
impl StreamTransaction for MemoryTransaction {
    async fn lock_stream(&mut self, id: Uuid) -> Result<Option<Stream>> {
        Ok(self.current(id).await)
    }

    async fn insert_stream(&mut self, stream: &Stream) -> Result<()> {
        let duplicate = self
            .streams
            .read()
            .await
            .values()
            .chain(self.staged.values())
            .any(|s| s.id == stream.id || s.remote_id == stream.remote_id);
        if duplicate {
            return Err(AppError::Conflict(format!(
                "remote stream {} is already registered",
                stream.remote_id
            )));
        }

        self.staged.insert(
            stream.id,
            Stream {
                targets: Vec::new(),
                ..stream.clone()
            },
        );
        Ok(())
    }

    async fn update_stream(&mut self, stream: &Stream) -> Result<i64> {
        let current = self
            .current(stream.id)
            .await
            .filter(|s| s.version == stream.version)
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "stream {} was modified concurrently (expected version {})",
                    stream.id, stream.version
                ))
            })?;

        let version = current.version + 1;
        self.staged.insert(
            stream.id,
            Stream {
                targets: current.targets,
                version,
                ..stream.clone()
            },
        );
        Ok(version)
    }

    async fn insert_target(&mut self, target: &MultistreamTarget) -> Result<()> {
        let mut stream = self
            .current(target.stream_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Stream {}", target.stream_id)))?;

        if stream.has_platform(target.platform) {
            return Err(AppError::Conflict(format!(
                "{} is already attached",
                target.platform
            )));
        }

        stream.targets.push(target.clone());
        self.staged.insert(stream.id, stream);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.fail_commit {
            return Err(AppError::Database("simulated commit failure".to_string()));
        }

        let mut streams = self.streams.write().await;
        for (id, stream) in self.staged {
            streams.insert(id, stream);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
