//! Stream record and its state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::target::{MultistreamTarget, TargetRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Created,
    Active,
    Suspended,
    Terminated,
    Deleted,
}

impl StreamStatus {
    pub const ALL: [StreamStatus; 5] = [
        StreamStatus::Created,
        StreamStatus::Active,
        StreamStatus::Suspended,
        StreamStatus::Terminated,
        StreamStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamStatus::Created => "created",
            StreamStatus::Active => "active",
            StreamStatus::Suspended => "suspended",
            StreamStatus::Terminated => "terminated",
            StreamStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(StreamStatus::Created),
            "active" => Ok(StreamStatus::Active),
            "suspended" => Ok(StreamStatus::Suspended),
            "terminated" => Ok(StreamStatus::Terminated),
            "deleted" => Ok(StreamStatus::Deleted),
            other => Err(format!("unknown stream status '{other}'")),
        }
    }
}

/// Operations on an existing stream. Creation has no source state and is
/// handled separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Activate,
    Suspend,
    Terminate,
    Delete,
    Update,
    AttachTarget,
}

impl Transition {
    pub const ALL: [Transition; 6] = [
        Transition::Activate,
        Transition::Suspend,
        Transition::Terminate,
        Transition::Delete,
        Transition::Update,
        Transition::AttachTarget,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Activate => "activate",
            Transition::Suspend => "suspend",
            Transition::Terminate => "terminate",
            Transition::Delete => "delete",
            Transition::Update => "update",
            Transition::AttachTarget => "attach_target",
        }
    }

    pub fn is_allowed_from(&self, status: StreamStatus) -> bool {
        use StreamStatus::*;
        match self {
            Transition::Activate => matches!(status, Created | Suspended),
            Transition::Suspend => matches!(status, Active),
            Transition::Terminate => matches!(status, Active | Suspended),
            Transition::Delete => !matches!(status, Deleted),
            Transition::Update | Transition::AttachTarget => {
                matches!(status, Created | Active | Suspended)
            }
        }
    }

    /// Status after the transition has been applied to a stream in `current`.
    pub fn resulting_status(&self, current: StreamStatus) -> StreamStatus {
        match self {
            Transition::Activate => StreamStatus::Active,
            Transition::Suspend => StreamStatus::Suspended,
            Transition::Terminate => StreamStatus::Terminated,
            Transition::Delete => StreamStatus::Deleted,
            Transition::Update | Transition::AttachTarget => current,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct EncodingProfile {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(range(min = 1))]
    pub bitrate: u32,
    #[validate(range(min = 1, max = 240))]
    pub fps: u32,
    #[validate(range(min = 16, max = 7680))]
    pub width: u32,
    #[validate(range(min = 16, max = 4320))]
    pub height: u32,
}

/// Replace profiles with a matching name and append the rest, keeping order.
pub fn merge_profiles(existing: &[EncodingProfile], incoming: &[EncodingProfile]) -> Vec<EncodingProfile> {
    let mut merged = existing.to_vec();
    for profile in incoming {
        match merged.iter_mut().find(|p| p.name == profile.name) {
            Some(slot) => *slot = profile.clone(),
            None => merged.push(profile.clone()),
        }
    }
    merged
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Provider-assigned id, set once at creation
    pub remote_id: String,
    pub playback_id: String,
    pub stream_key: String,
    pub title: String,
    pub description: Option<String>,
    pub visibility: bool,
    pub profiles: Vec<EncodingProfile>,
    pub status: StreamStatus,
    pub schedule_date: Option<DateTime<Utc>>,
    pub targets: Vec<MultistreamTarget>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Stream {
    pub fn has_platform(&self, platform: super::Platform) -> bool {
        self.targets.iter().any(|t| t.platform == platform)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateStreamRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub profiles: Vec<EncodingProfile>,
    pub schedule_date: Option<DateTime<Utc>>,
    #[serde(default)]
    #[validate(nested)]
    pub platforms: Vec<TargetRequest>,
    #[serde(default = "default_visibility")]
    pub visibility: bool,
}

fn default_visibility() -> bool {
    true
}

/// Partial update of stream metadata. Profiles are merged by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct StreamChanges {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub visibility: Option<bool>,
    pub schedule_date: Option<DateTime<Utc>>,
    #[validate(nested)]
    pub profiles: Option<Vec<EncodingProfile>>,
}

impl StreamChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.visibility.is_none()
            && self.schedule_date.is_none()
            && self.profiles.is_none()
    }

    /// Whether the provider-side name or playback policy changes.
    pub fn touches_remote_metadata(&self, stream: &Stream) -> bool {
        self.title.as_ref().is_some_and(|t| *t != stream.title)
            || self.visibility.is_some_and(|v| v != stream.visibility)
    }

    pub fn apply_to(&self, stream: &mut Stream) {
        if let Some(title) = &self.title {
            stream.title = title.clone();
        }
        if let Some(description) = &self.description {
            stream.description = Some(description.clone());
        }
        if let Some(visibility) = self.visibility {
            stream.visibility = visibility;
        }
        if let Some(schedule_date) = self.schedule_date {
            stream.schedule_date = Some(schedule_date);
        }
        if let Some(profiles) = &self.profiles {
            stream.profiles = merge_profiles(&stream.profiles, profiles);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, bitrate: u32) -> EncodingProfile {
        EncodingProfile {
            name: name.into(),
            bitrate,
            fps: 30,
            width: 1280,
            height: 720,
        }
    }

    #[test]
    fn transition_table() {
        use StreamStatus::*;
        let allowed = |t: Transition| -> Vec<StreamStatus> {
            StreamStatus::ALL
                .into_iter()
                .filter(|s| t.is_allowed_from(*s))
                .collect()
        };

        assert_eq!(allowed(Transition::Activate), vec![Created, Suspended]);
        assert_eq!(allowed(Transition::Suspend), vec![Active]);
        assert_eq!(allowed(Transition::Terminate), vec![Active, Suspended]);
        assert_eq!(allowed(Transition::Delete), vec![Created, Active, Suspended, Terminated]);
        assert_eq!(allowed(Transition::Update), vec![Created, Active, Suspended]);
        assert_eq!(allowed(Transition::AttachTarget), vec![Created, Active, Suspended]);
    }

    #[test]
    fn update_keeps_status() {
        assert_eq!(
            Transition::Update.resulting_status(StreamStatus::Suspended),
            StreamStatus::Suspended
        );
        assert_eq!(
            Transition::Delete.resulting_status(StreamStatus::Terminated),
            StreamStatus::Deleted
        );
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in StreamStatus::ALL {
            assert_eq!(status.as_str().parse::<StreamStatus>(), Ok(status));
        }
        assert!("live".parse::<StreamStatus>().is_err());
    }

    #[test]
    fn merge_replaces_by_name_and_appends() {
        let existing = vec![profile("720p", 3_000_000), profile("480p", 1_600_000)];
        let merged = merge_profiles(&existing, &[profile("480p", 1_000_000), profile("1080p", 6_000_000)]);

        let names: Vec<_> = merged.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["720p", "480p", "1080p"]);
        assert_eq!(merged[1].bitrate, 1_000_000);
    }

    #[test]
    fn create_request_defaults_to_public() {
        let req: CreateStreamRequest = serde_json::from_str(r#"{"title":"launch"}"#).unwrap();
        assert!(req.visibility);
        assert!(req.platforms.is_empty());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn invalid_profile_fails_validation() {
        let req: CreateStreamRequest = serde_json::from_value(serde_json::json!({
            "title": "launch",
            "profiles": [{"name": "bad", "bitrate": 0, "fps": 30, "width": 1280, "height": 720}]
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }
}
