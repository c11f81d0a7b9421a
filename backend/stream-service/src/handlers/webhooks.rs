use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::{info, warn};

use super::AppState;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::ApiResponse;
use crate::security::SIGNATURE_HEADER;
use crate::services::{EventOutcome, ProviderEvent};

#[derive(Debug, Deserialize)]
struct WebhookStream {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    event: String,
    stream: Option<WebhookStream>,
}

fn ack(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::<()>::success(200, message, None))
}

/// Provider callback. The signature is checked over the raw body before
/// anything is parsed.
pub async fn media_provider_event(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let header = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    if let Err(e) = state.webhooks.verify(header, &body) {
        warn!(error = %e, "Rejected provider webhook");
        metrics::record_webhook_event("unverified", "rejected");
        return Err(AppError::Signature(e));
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("invalid webhook payload: {e}")))?;

    let (Some(event), Some(stream)) = (ProviderEvent::parse(&payload.event), payload.stream) else {
        info!(event = %payload.event, "Ignoring provider webhook");
        metrics::record_webhook_event(&payload.event, "ignored");
        return Ok(ack("Event ignored"));
    };

    match state.lifecycle.apply_provider_event(event, &stream.id).await {
        Ok(EventOutcome::Applied(status)) => {
            info!(event = %payload.event, remote_id = %stream.id, %status, "Provider webhook applied");
            metrics::record_webhook_event(&payload.event, "applied");
            Ok(ack("Event applied"))
        }
        Ok(EventOutcome::AlreadyApplied(_)) | Ok(EventOutcome::UnknownStream) => {
            metrics::record_webhook_event(&payload.event, "ignored");
            Ok(ack("Event acknowledged"))
        }
        Err(e) => {
            metrics::record_webhook_event(&payload.event, "failed");
            Err(e)
        }
    }
}
