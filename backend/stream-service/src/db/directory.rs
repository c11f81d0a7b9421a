//! Project membership and linked platform credentials
//!
//! Both are owned by other services. The stream service only reads them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::Platform;

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub peers: Vec<Uuid>,
}

impl Project {
    pub fn is_owner(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }

    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.is_owner(user_id) || self.peers.contains(&user_id)
    }
}

/// OAuth link between a user and a broadcast platform.
#[derive(Clone, PartialEq)]
pub struct PlatformCredential {
    pub platform: Platform,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Ingest key on the destination platform, used when fanning out.
    pub destination_stream_key: Option<String>,
}

impl PlatformCredential {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && self.expires_at.map_or(true, |exp| exp > now)
    }
}

impl std::fmt::Debug for PlatformCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformCredential")
            .field("platform", &self.platform)
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field(
                "destination_stream_key",
                &self.destination_stream_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialDirectory: Send + Sync {
    async fn find_credential(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<PlatformCredential>>;

    /// The credential only if it is present and not expired.
    async fn valid_credential(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<PlatformCredential>> {
        let now = Utc::now();
        Ok(self
            .find_credential(user_id, platform)
            .await?
            .filter(|c| c.is_valid_at(now)))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    async fn find_project(&self, project_id: Uuid) -> Result<Option<Project>>;

    async fn require_project(&self, project_id: Uuid) -> Result<Project> {
        self.find_project(project_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Project {project_id}")))
    }
}

#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    platform: String,
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    destination_stream_key: Option<String>,
}

#[async_trait]
impl CredentialDirectory for PgDirectory {
    async fn find_credential(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<PlatformCredential>> {
        let row: Option<CredentialRow> = sqlx::query_as(
            "SELECT platform, access_token, refresh_token, expires_at, destination_stream_key \
             FROM platform_credentials WHERE user_id = $1 AND platform = $2",
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(PlatformCredential {
                platform: row.platform.parse().map_err(AppError::Internal)?,
                access_token: row.access_token,
                refresh_token: row.refresh_token,
                expires_at: row.expires_at,
                destination_stream_key: row.destination_stream_key,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl ProjectDirectory for PgDirectory {
    async fn find_project(&self, project_id: Uuid) -> Result<Option<Project>> {
        let owner: Option<(Uuid,)> = sqlx::query_as("SELECT owner_id FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some((owner_id,)) = owner else {
            return Ok(None);
        };

        let peers: Vec<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM project_peers WHERE project_id = $1")
                .bind(project_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(Project {
            id: project_id,
            owner_id,
            peers: peers.into_iter().map(|(id,)| id).collect(),
        }))
    }
}

/// Directory backed by process memory, seeded by callers.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    projects: Arc<RwLock<HashMap<Uuid, Project>>>,
    credentials: Arc<RwLock<HashMap<(Uuid, Platform), PlatformCredential>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_project(&self, project: Project) {
        self.projects.write().await.insert(project.id, project);
    }

    pub async fn add_credential(&self, user_id: Uuid, credential: PlatformCredential) {
        self.credentials
            .write()
            .await
            .insert((user_id, credential.platform), credential);
    }

    pub async fn remove_credential(&self, user_id: Uuid, platform: Platform) {
        self.credentials.write().await.remove(&(user_id, platform));
    }
}

#[async_trait]
impl CredentialDirectory for MemoryDirectory {
    async fn find_credential(
        &self,
        user_id: Uuid,
        platform: Platform,
    ) -> Result<Option<PlatformCredential>> {
        Ok(self
            .credentials
            .read()
            .await
            .get(&(user_id, platform))
            .cloned())
    }
}

#[async_trait]
impl ProjectDirectory for MemoryDirectory {
    async fn find_project(&self, project_id: Uuid) -> Result<Option<Project>> {
        Ok(self.projects.read().await.get(&project_id).cloned())
    }
}
