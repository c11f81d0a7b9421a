//! PostgreSQL implementation of the persistence adapter

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{StreamStore, StreamTransaction};
use crate::error::{AppError, Result};
use crate::models::{
    EncodingProfile, IntentOperation, IntentOutcome, MultistreamTarget, Page, Stream,
    StreamIntent, TargetIngest,
};

const STREAM_COLUMNS: &str = "id, project_id, remote_id, playback_id, stream_key, title, \
     description, visibility, profiles, status, schedule_date, version, created_at, updated_at";

const TARGET_COLUMNS: &str =
    "id, stream_id, platform, profile, video_only, ingest_name, ingest_url, stream_key, created_at";

const INTENT_COLUMNS: &str =
    "id, stream_id, operation, remote_id, attempts, last_error, created_at, resolved_at, outcome";

#[derive(sqlx::FromRow)]
struct StreamRow {
    id: Uuid,
    project_id: Uuid,
    remote_id: String,
    playback_id: String,
    stream_key: String,
    title: String,
    description: Option<String>,
    visibility: bool,
    profiles: Json<Vec<EncodingProfile>>,
    status: String,
    schedule_date: Option<DateTime<Utc>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StreamRow {
    fn into_stream(self, targets: Vec<MultistreamTarget>) -> Result<Stream> {
        Ok(Stream {
            id: self.id,
            project_id: self.project_id,
            remote_id: self.remote_id,
            playback_id: self.playback_id,
            stream_key: self.stream_key,
            title: self.title,
            description: self.description,
            visibility: self.visibility,
            profiles: self.profiles.0,
            status: self.status.parse().map_err(AppError::Internal)?,
            schedule_date: self.schedule_date,
            targets,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TargetRow {
    id: Uuid,
    stream_id: Uuid,
    platform: String,
    profile: String,
    video_only: bool,
    ingest_name: String,
    ingest_url: String,
    stream_key: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<TargetRow> for MultistreamTarget {
    type Error = AppError;

    fn try_from(row: TargetRow) -> Result<Self> {
        Ok(MultistreamTarget {
            id: row.id,
            stream_id: row.stream_id,
            platform: row.platform.parse().map_err(AppError::Internal)?,
            profile: row.profile,
            video_only: row.video_only,
            ingest: TargetIngest {
                name: row.ingest_name,
                url: row.ingest_url,
                stream_key: row.stream_key,
            },
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct IntentRow {
    id: Uuid,
    stream_id: Uuid,
    operation: Json<IntentOperation>,
    remote_id: Option<String>,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    outcome: Option<String>,
}

impl TryFrom<IntentRow> for StreamIntent {
    type Error = AppError;

    fn try_from(row: IntentRow) -> Result<Self> {
        Ok(StreamIntent {
            id: row.id,
            stream_id: row.stream_id,
            operation: row.operation.0,
            remote_id: row.remote_id,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
            outcome: row
                .outcome
                .map(|o| o.parse::<IntentOutcome>())
                .transpose()
                .map_err(AppError::Internal)?,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

async fn load_targets(conn: &mut PgConnection, stream_id: Uuid) -> Result<Vec<MultistreamTarget>> {
    let rows: Vec<TargetRow> = sqlx::query_as(&format!(
        "SELECT {TARGET_COLUMNS} FROM multistream_targets WHERE stream_id = $1 ORDER BY created_at"
    ))
    .bind(stream_id)
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(MultistreamTarget::try_from).collect()
}

#[derive(Clone)]
pub struct PgStreamStore {
    pool: PgPool,
}

impl PgStreamStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_targets(&self, row: Option<StreamRow>) -> Result<Option<Stream>> {
        match row {
            Some(row) => {
                let mut conn = self.pool.acquire().await?;
                let targets = load_targets(&mut conn, row.id).await?;
                Ok(Some(row.into_stream(targets)?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StreamStore for PgStreamStore {
    async fn begin(&self) -> Result<Box<dyn StreamTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStreamTransaction { tx }))
    }

    async fn find_stream(&self, id: Uuid) -> Result<Option<Stream>> {
        let row: Option<StreamRow> =
            sqlx::query_as(&format!("SELECT {STREAM_COLUMNS} FROM streams WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        self.with_targets(row).await
    }

    async fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<Stream>> {
        let row: Option<StreamRow> = sqlx::query_as(&format!(
            "SELECT {STREAM_COLUMNS} FROM streams WHERE remote_id = $1"
        ))
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;
        self.with_targets(row).await
    }

    async fn list_by_project(&self, project_id: Uuid, page: Page) -> Result<(Vec<Stream>, i64)> {
        let rows: Vec<StreamRow> = sqlx::query_as(&format!(
            "SELECT {STREAM_COLUMNS} FROM streams \
             WHERE project_id = $1 AND status <> 'deleted' \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(project_id)
        .bind(page.limit as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM streams WHERE project_id = $1 AND status <> 'deleted'",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await?;

        let streams = rows
            .into_iter()
            .map(|row| row.into_stream(Vec::new()))
            .collect::<Result<Vec<_>>>()?;
        Ok((streams, total))
    }

    async fn record_intent(&self, intent: &StreamIntent) -> Result<()> {
        sqlx::query(
            "INSERT INTO stream_intents (id, stream_id, operation, remote_id, attempts, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(intent.id)
        .bind(intent.stream_id)
        .bind(Json(&intent.operation))
        .bind(&intent.remote_id)
        .bind(intent.attempts)
        .bind(intent.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_intent_remote_id(&self, intent_id: Uuid, remote_id: &str) -> Result<()> {
        sqlx::query("UPDATE stream_intents SET remote_id = $2 WHERE id = $1")
            .bind(intent_id)
            .bind(remote_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn resolve_intent(
        &self,
        intent_id: Uuid,
        outcome: IntentOutcome,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE stream_intents \
             SET resolved_at = NOW(), outcome = $2, last_error = COALESCE($3, last_error) \
             WHERE id = $1 AND resolved_at IS NULL",
        )
        .bind(intent_id)
        .bind(outcome.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_intent_failure(&self, intent_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE stream_intents SET attempts = attempts + 1, last_error = $2 WHERE id = $1",
        )
        .bind(intent_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stale_intents(
        &self,
        older_than: DateTime<Utc>,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<StreamIntent>> {
        let rows: Vec<IntentRow> = sqlx::query_as(&format!(
            "SELECT {INTENT_COLUMNS} FROM stream_intents \
             WHERE resolved_at IS NULL AND created_at < $1 AND attempts < $2 \
             ORDER BY created_at LIMIT $3"
        ))
        .bind(older_than)
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StreamIntent::try_from).collect()
    }

    async fn find_intent(&self, intent_id: Uuid) -> Result<Option<StreamIntent>> {
        let row: Option<IntentRow> = sqlx::query_as(&format!(
            "SELECT {INTENT_COLUMNS} FROM stream_intents WHERE id = $1"
        ))
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StreamIntent::try_from).transpose()
    }
}

pub struct PgStreamTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StreamTransaction for PgStreamTransaction {
    async fn lock_stream(&mut self, id: Uuid) -> Result<Option<Stream>> {
        let row: Option<StreamRow> = sqlx::query_as(&format!(
            "SELECT {STREAM_COLUMNS} FROM streams WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => {
                let targets = load_targets(&mut self.tx, id).await?;
                Ok(Some(row.into_stream(targets)?))
            }
            None => Ok(None),
        }
    }

    async fn insert_stream(&mut self, stream: &Stream) -> Result<()> {
        sqlx::query(
            "INSERT INTO streams (id, project_id, remote_id, playback_id, stream_key, title, \
             description, visibility, profiles, status, schedule_date, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(stream.id)
        .bind(stream.project_id)
        .bind(&stream.remote_id)
        .bind(&stream.playback_id)
        .bind(&stream.stream_key)
        .bind(&stream.title)
        .bind(&stream.description)
        .bind(stream.visibility)
        .bind(Json(&stream.profiles))
        .bind(stream.status.as_str())
        .bind(stream.schedule_date)
        .bind(stream.version)
        .bind(stream.created_at)
        .bind(stream.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("remote stream {} is already registered", stream.remote_id))
            } else {
                AppError::from(e)
            }
        })?;
        Ok(())
    }

    async fn update_stream(&mut self, stream: &Stream) -> Result<i64> {
        let version: Option<i64> = sqlx::query_scalar(
            "UPDATE streams SET title = $3, description = $4, visibility = $5, profiles = $6, \
             status = $7, schedule_date = $8, updated_at = $9, version = version + 1 \
             WHERE id = $1 AND version = $2 \
             RETURNING version",
        )
        .bind(stream.id)
        .bind(stream.version)
        .bind(&stream.title)
        .bind(&stream.description)
        .bind(stream.visibility)
        .bind(Json(&stream.profiles))
        .bind(stream.status.as_str())
        .bind(stream.schedule_date)
        .bind(stream.updated_at)
        .fetch_optional(&mut *self.tx)
        .await?;

        version.ok_or_else(|| {
            AppError::Conflict(format!(
                "stream {} was modified concurrently (expected version {})",
                stream.id, stream.version
            ))
        })
    }

    async fn insert_target(&mut self, target: &MultistreamTarget) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO multistream_targets ({TARGET_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(target.id)
        .bind(target.stream_id)
        .bind(target.platform.as_str())
        .bind(&target.profile)
        .bind(target.video_only)
        .bind(&target.ingest.name)
        .bind(&target.ingest.url)
        .bind(&target.ingest.stream_key)
        .bind(target.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("{} is already attached", target.platform))
            } else {
                AppError::from(e)
            }
        })?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
