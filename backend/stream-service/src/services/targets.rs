//! Multistream target validation
//!
//! Requests are checked as a batch. Every static check and every credential
//! lookup completes before a single target is built, so one bad platform
//! rejects the whole request with no side effects.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::db::{CredentialDirectory, Project};
use crate::error::{AppError, Result};
use crate::models::{
    EncodingProfile, MultistreamTarget, Platform, Stream, TargetIngest, TargetRequest,
    SOURCE_PROFILE,
};

#[derive(Clone)]
pub struct TargetManager {
    credentials: Arc<dyn CredentialDirectory>,
}

fn profile_exists(profiles: &[EncodingProfile], name: &str) -> bool {
    name == SOURCE_PROFILE || profiles.iter().any(|p| p.name == name)
}

fn check_custom_ingest(request: &TargetRequest) -> Result<()> {
    let url = request.url.as_deref().unwrap_or_default();
    let key = request.stream_key.as_deref().unwrap_or_default();
    if url.is_empty() || key.is_empty() {
        return Err(AppError::Validation(
            "custom_rtmp targets need both url and stream_key".to_string(),
        ));
    }
    if !(url.starts_with("rtmp://") || url.starts_with("rtmps://")) {
        return Err(AppError::Validation(format!(
            "custom_rtmp url must use rtmp:// or rtmps://, got '{url}'"
        )));
    }
    Ok(())
}

impl TargetManager {
    pub fn new(credentials: Arc<dyn CredentialDirectory>) -> Self {
        Self { credentials }
    }

    /// Validate the requested destinations for a new stream and build one
    /// target per platform.
    pub async fn validate_targets(
        &self,
        project: &Project,
        stream_id: Uuid,
        requests: &[TargetRequest],
        profiles: &[EncodingProfile],
    ) -> Result<Vec<MultistreamTarget>> {
        let mut seen = HashSet::new();
        for request in requests {
            if !seen.insert(request.platform) {
                return Err(AppError::Validation(format!(
                    "{} is listed more than once",
                    request.platform
                )));
            }
            self.check_request(request, profiles)?;
        }

        let mut ingests = Vec::with_capacity(requests.len());
        for request in requests {
            ingests.push(self.resolve_ingest(project.owner_id, request).await?);
        }

        debug!(
            project_id = %project.id,
            count = ingests.len(),
            "Multistream targets authorized"
        );

        Ok(requests
            .iter()
            .zip(ingests)
            .map(|(request, ingest)| build_target(stream_id, request, ingest))
            .collect())
    }

    /// Validate a single destination being added to an existing stream.
    pub async fn validate_attachment(
        &self,
        project: &Project,
        stream: &Stream,
        request: &TargetRequest,
    ) -> Result<MultistreamTarget> {
        if stream.has_platform(request.platform) {
            return Err(AppError::Conflict(format!(
                "{} is already attached to this stream",
                request.platform
            )));
        }
        self.check_request(request, &stream.profiles)?;

        let ingest = self.resolve_ingest(project.owner_id, request).await?;
        Ok(build_target(stream.id, request, ingest))
    }

    fn check_request(&self, request: &TargetRequest, profiles: &[EncodingProfile]) -> Result<()> {
        if !profile_exists(profiles, &request.profile) {
            return Err(AppError::Validation(format!(
                "{} references unknown profile '{}'",
                request.platform, request.profile
            )));
        }
        if request.platform == Platform::CustomRtmp {
            check_custom_ingest(request)?;
        }
        Ok(())
    }

    async fn resolve_ingest(&self, owner_id: Uuid, request: &TargetRequest) -> Result<TargetIngest> {
        let name = request
            .name
            .clone()
            .unwrap_or_else(|| request.platform.display_name().to_string());

        if !request.platform.requires_credential() {
            return Ok(TargetIngest {
                name,
                url: request.url.clone().unwrap_or_default(),
                stream_key: request.stream_key.clone().unwrap_or_default(),
            });
        }

        let credential = self
            .credentials
            .valid_credential(owner_id, request.platform)
            .await?
            .ok_or(AppError::Credential(request.platform))?;
        let stream_key = credential
            .destination_stream_key
            .filter(|k| !k.is_empty())
            .ok_or(AppError::Credential(request.platform))?;

        Ok(TargetIngest {
            name,
            url: request.platform.ingest_url().unwrap_or_default().to_string(),
            stream_key,
        })
    }
}

fn build_target(stream_id: Uuid, request: &TargetRequest, ingest: TargetIngest) -> MultistreamTarget {
    MultistreamTarget {
        id: Uuid::new_v4(),
        stream_id,
        platform: request.platform,
        profile: request.profile.clone(),
        video_only: request.video_only,
        ingest,
        created_at: Utc::now(),
    }
}
