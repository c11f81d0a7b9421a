//! HTTP surface of stream-service
//!
//! Handlers are thin: extract, delegate to [`LifecycleService`], wrap the
//! result in the [`ApiResponse`](crate::models::ApiResponse) envelope.

use actix_web::{web, HttpResponse};
use serde_json::json;
use std::sync::Arc;

use crate::db::ProjectDirectory;
use crate::error::AppError;
use crate::middleware::JwtAuthMiddleware;
use crate::security::{TokenService, WebhookVerifier};
use crate::services::LifecycleService;

pub mod access;
pub mod streams;
pub mod webhooks;

/// Shared state handed to every handler.
pub struct AppState {
    pub lifecycle: Arc<LifecycleService>,
    pub projects: Arc<dyn ProjectDirectory>,
    pub tokens: TokenService,
    pub webhooks: WebhookVerifier,
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "stream-service",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Register routes and shared state.
///
/// The webhook, access-key callback and health routes are unauthenticated;
/// everything else requires a bearer token.
pub fn configure(cfg: &mut web::ServiceConfig, state: web::Data<AppState>) {
    let tokens = state.tokens.clone();

    cfg.app_data(state)
        .app_data(web::JsonConfig::default().error_handler(|err, _req| {
            AppError::Validation(err.to_string()).into()
        }))
        .app_data(web::QueryConfig::default().error_handler(|err, _req| {
            AppError::Validation(err.to_string()).into()
        }))
        .route("/metrics", web::get().to(crate::metrics::serve_metrics))
        .service(
            web::scope("/api/v1")
                .route("/health", web::get().to(health))
                .route(
                    "/webhooks/media-provider",
                    web::post().to(webhooks::media_provider_event),
                )
                .route(
                    "/streams/verify-access-key",
                    web::post().to(access::verify_access_key),
                )
                .service(
                    web::scope("")
                        .wrap(JwtAuthMiddleware::new(tokens))
                        .route(
                            "/streams/access-token",
                            web::post().to(access::generate_access_token),
                        )
                        .service(
                            web::resource("/projects/{project_id}/streams")
                                .route(web::post().to(streams::create_stream))
                                .route(web::get().to(streams::list_streams)),
                        )
                        .service(
                            web::resource("/streams/{id}")
                                .route(web::get().to(streams::get_stream))
                                .route(web::patch().to(streams::update_stream))
                                .route(web::delete().to(streams::delete_stream)),
                        )
                        .route("/streams/{id}/targets", web::post().to(streams::attach_target))
                        .route("/streams/{id}/activate", web::post().to(streams::activate_stream))
                        .route("/streams/{id}/suspend", web::post().to(streams::suspend_stream))
                        .route(
                            "/streams/{id}/terminate",
                            web::post().to(streams::terminate_stream),
                        ),
                ),
        );
}
