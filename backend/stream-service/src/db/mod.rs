//! Persistence adapter
//!
//! [`StreamStore`] hands out scoped [`StreamTransaction`]s. A transaction
//! that is dropped without [`StreamTransaction::commit`] rolls back, so every
//! early return in the lifecycle service leaves the stored record untouched.
//!
//! Intents are written outside the stream transaction so they survive a
//! rollback or a crash between the provider call and the commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{IntentOutcome, MultistreamTarget, Page, Stream, StreamIntent};

pub mod directory;
pub mod memory;
pub mod pool;
pub mod postgres;

pub use directory::{
    CredentialDirectory, MemoryDirectory, PgDirectory, PlatformCredential, Project, ProjectDirectory,
};
#[cfg(test)]
pub use directory::MockCredentialDirectory;
pub use memory::MemoryStore;
pub use postgres::PgStreamStore;

#[async_trait]
pub trait StreamStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StreamTransaction>>;

    /// Read without locking. Includes targets.
    async fn find_stream(&self, id: Uuid) -> Result<Option<Stream>>;

    async fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<Stream>>;

    /// Page of a project's streams, newest first, without targets, plus the
    /// total count.
    async fn list_by_project(&self, project_id: Uuid, page: Page) -> Result<(Vec<Stream>, i64)>;

    async fn record_intent(&self, intent: &StreamIntent) -> Result<()>;

    async fn set_intent_remote_id(&self, intent_id: Uuid, remote_id: &str) -> Result<()>;

    async fn resolve_intent(
        &self,
        intent_id: Uuid,
        outcome: IntentOutcome,
        error: Option<&str>,
    ) -> Result<()>;

    async fn record_intent_failure(&self, intent_id: Uuid, error: &str) -> Result<()>;

    /// Unresolved intents created before `older_than` with fewer than
    /// `max_attempts` attempts, oldest first.
    async fn stale_intents(
        &self,
        older_than: DateTime<Utc>,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<StreamIntent>>;

    async fn find_intent(&self, intent_id: Uuid) -> Result<Option<StreamIntent>>;
}

#[async_trait]
pub trait StreamTransaction: Send {
    /// Load and lock the stream for the rest of the transaction.
    async fn lock_stream(&mut self, id: Uuid) -> Result<Option<Stream>>;

    async fn insert_stream(&mut self, stream: &Stream) -> Result<()>;

    /// Persist scalar fields and bump `version`. Fails with `Conflict` if the
    /// stored version is not `stream.version`.
    async fn update_stream(&mut self, stream: &Stream) -> Result<i64>;

    async fn insert_target(&mut self, target: &MultistreamTarget) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
