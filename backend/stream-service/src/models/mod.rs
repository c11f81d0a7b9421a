/// Data models for stream-service
///
/// Stored records, request payloads, and the public projections returned by
/// the HTTP layer.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod intent;
pub mod stream;
pub mod target;

pub use intent::{IntentOperation, IntentOutcome, StreamIntent};
pub use stream::{
    merge_profiles, CreateStreamRequest, EncodingProfile, Stream, StreamChanges, StreamStatus,
    Transition,
};
pub use target::{MultistreamTarget, Platform, TargetIngest, TargetRequest, SOURCE_PROFILE};

/// Target as shown to clients; the destination key is never echoed back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetView {
    pub platform: Platform,
    pub profile: String,
    pub video_only: bool,
    pub name: String,
    pub url: String,
}

/// Full detail for one stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSingleView {
    pub id: Uuid,
    pub project_id: Uuid,
    pub playback_id: String,
    /// Ingest key, present only for the project owner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_key: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub visibility: bool,
    pub profiles: Vec<EncodingProfile>,
    pub status: StreamStatus,
    pub schedule_date: Option<DateTime<Utc>>,
    pub targets: Vec<TargetView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sparse projection for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamListView {
    pub id: Uuid,
    pub title: String,
    pub status: StreamStatus,
    pub visibility: bool,
    pub playback_id: String,
    pub schedule_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Stream {
    pub fn single_view(&self, include_stream_key: bool) -> StreamSingleView {
        StreamSingleView {
            id: self.id,
            project_id: self.project_id,
            playback_id: self.playback_id.clone(),
            stream_key: include_stream_key.then(|| self.stream_key.clone()),
            title: self.title.clone(),
            description: self.description.clone(),
            visibility: self.visibility,
            profiles: self.profiles.clone(),
            status: self.status,
            schedule_date: self.schedule_date,
            targets: self
                .targets
                .iter()
                .map(|t| TargetView {
                    platform: t.platform,
                    profile: t.profile.clone(),
                    video_only: t.video_only,
                    name: t.ingest.name.clone(),
                    url: t.ingest.url.clone(),
                })
                .collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn list_view(&self) -> StreamListView {
        StreamListView {
            id: self.id,
            title: self.title.clone(),
            status: self.status,
            visibility: self.visibility,
            playback_id: self.playback_id.clone(),
            schedule_date: self.schedule_date,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub limit: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }
}

impl Default for Page {
    fn default() -> Self {
        Page {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

impl From<PageQuery> for Page {
    fn from(query: PageQuery) -> Self {
        Page {
            page: query.page.unwrap_or(1).max(1),
            limit: query
                .limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageMeta {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl PageMeta {
    pub fn new(page: Page, total: i64) -> Self {
        let limit = page.limit as i64;
        Self {
            page: page.page,
            limit: page.limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

/// Success envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status_code: u16,
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(status_code: u16, message: impl Into<String>, results: Option<T>) -> Self {
        Self {
            status_code,
            status: "success",
            message: message.into(),
            results,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: PageMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}
