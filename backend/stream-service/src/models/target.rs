//! Multistream destinations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

/// Profile reference meaning "forward the ingest rendition unchanged".
pub const SOURCE_PROFILE: &str = "source";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "twitch")]
    Twitch,
    #[serde(rename = "youtube")]
    YouTube,
    #[serde(rename = "custom_rtmp")]
    CustomRtmp,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitch => "twitch",
            Platform::YouTube => "youtube",
            Platform::CustomRtmp => "custom_rtmp",
        }
    }

    /// Ingest endpoint for OAuth-linked platforms.
    pub fn ingest_url(&self) -> Option<&'static str> {
        match self {
            Platform::Twitch => Some("rtmp://live.twitch.tv/app"),
            Platform::YouTube => Some("rtmp://a.rtmp.youtube.com/live2"),
            Platform::CustomRtmp => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Twitch => "Twitch",
            Platform::YouTube => "YouTube",
            Platform::CustomRtmp => "Custom RTMP",
        }
    }

    pub fn requires_credential(&self) -> bool {
        !matches!(self, Platform::CustomRtmp)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "twitch" => Ok(Platform::Twitch),
            "youtube" => Ok(Platform::YouTube),
            "custom_rtmp" => Ok(Platform::CustomRtmp),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetIngest {
    pub name: String,
    pub url: String,
    pub stream_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultistreamTarget {
    pub id: Uuid,
    pub stream_id: Uuid,
    pub platform: Platform,
    /// Encoding profile name, or [`SOURCE_PROFILE`]
    pub profile: String,
    pub video_only: bool,
    pub ingest: TargetIngest,
    pub created_at: DateTime<Utc>,
}

impl MultistreamTarget {
    /// Full RTMP push URL including the destination stream key.
    pub fn push_url(&self) -> String {
        format!(
            "{}/{}",
            self.ingest.url.trim_end_matches('/'),
            self.ingest.stream_key
        )
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TargetRequest {
    pub platform: Platform,
    #[serde(default = "default_profile")]
    #[validate(length(min = 1, max = 64))]
    pub profile: String,
    #[serde(default)]
    pub video_only: bool,
    #[validate(length(max = 255))]
    pub name: Option<String>,
    /// Custom RTMP only
    #[validate(length(min = 1, max = 2048))]
    pub url: Option<String>,
    /// Custom RTMP only
    #[validate(length(min = 1, max = 512))]
    pub stream_key: Option<String>,
}

fn default_profile() -> String {
    SOURCE_PROFILE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_wire_names() {
        assert_eq!(serde_json::to_string(&Platform::YouTube).unwrap(), "\"youtube\"");
        assert_eq!(
            serde_json::from_str::<Platform>("\"custom_rtmp\"").unwrap(),
            Platform::CustomRtmp
        );
        assert_eq!("twitch".parse::<Platform>(), Ok(Platform::Twitch));
    }

    #[test]
    fn push_url_joins_key() {
        let target = MultistreamTarget {
            id: Uuid::new_v4(),
            stream_id: Uuid::new_v4(),
            platform: Platform::Twitch,
            profile: SOURCE_PROFILE.into(),
            video_only: false,
            ingest: TargetIngest {
                name: "Twitch".into(),
                url: "rtmp://live.twitch.tv/app/".into(),
                stream_key: "live_123".into(),
            },
            created_at: Utc::now(),
        };
        assert_eq!(target.push_url(), "rtmp://live.twitch.tv/app/live_123");
    }

    #[test]
    fn target_request_defaults_to_source_profile() {
        let req: TargetRequest = serde_json::from_str(r#"{"platform":"twitch"}"#).unwrap();
        assert_eq!(req.profile, SOURCE_PROFILE);
        assert!(!req.video_only);
    }
}
