use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use super::AppState;
use crate::error::{AppError, Result};
use crate::middleware::UserId;
use crate::models::ApiResponse;

/// Playback access key for the caller, presented by viewers of private streams.
pub async fn generate_access_token(
    user: UserId,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let issued = state.tokens.issue_access_token(user.0)?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(
        200,
        "Access token generated successfully",
        Some(issued),
    )))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessContext {
    pub project_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAccessKeyRequest {
    pub access_key: String,
    pub context: AccessContext,
}

/// Playback-policy callback from the media provider. Allowed when the key is
/// valid and its holder belongs to the stream's project.
pub async fn verify_access_key(
    state: web::Data<AppState>,
    payload: web::Json<VerifyAccessKeyRequest>,
) -> Result<HttpResponse> {
    let request = payload.into_inner();
    let user_id = state.tokens.verify_access_token(&request.access_key)?;

    let allowed = state
        .projects
        .find_project(request.context.project_id)
        .await?
        .is_some_and(|project| project.is_member(user_id));

    if !allowed {
        debug!(
            user_id = %user_id,
            project_id = %request.context.project_id,
            "Playback access denied"
        );
        return Err(AppError::Forbidden(
            "You are not authorized to watch this stream".to_string(),
        ));
    }

    Ok(HttpResponse::Ok().json(ApiResponse::<()>::success(
        200,
        "Access key verified successfully",
        None,
    )))
}
