use actix_web::{web, HttpResponse};
use uuid::Uuid;

use super::AppState;
use crate::error::Result;
use crate::middleware::UserId;
use crate::models::{
    ApiResponse, CreateStreamRequest, Page, PageQuery, StreamChanges, StreamListView,
    StreamSingleView, TargetRequest,
};
use crate::services::Actor;

pub async fn create_stream(
    user: UserId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
    payload: web::Json<CreateStreamRequest>,
) -> Result<HttpResponse> {
    let project_id = path.into_inner();
    let stream = state
        .lifecycle
        .create_stream(user.0, project_id, payload.into_inner())
        .await?;

    Ok(HttpResponse::Created().json(ApiResponse::success(
        201,
        "Stream created successfully",
        Some(stream.single_view(true)),
    )))
}

pub async fn list_streams(
    user: UserId,
    path: web::Path<Uuid>,
    query: web::Query<PageQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let page = Page::from(query.into_inner());
    let (items, meta) = state
        .lifecycle
        .list_streams(user.0, path.into_inner(), page)
        .await?;

    Ok(HttpResponse::Ok().json(
        ApiResponse::<Vec<StreamListView>>::success(200, "Streams fetched successfully", Some(items))
            .with_meta(meta),
    ))
}

pub async fn get_stream(
    user: UserId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let view = state.lifecycle.get_stream(user.0, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(
        200,
        "Stream fetched successfully",
        Some(view),
    )))
}

pub async fn update_stream(
    user: UserId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
    payload: web::Json<StreamChanges>,
) -> Result<HttpResponse> {
    let stream = state
        .lifecycle
        .update_stream(Actor::User(user.0), path.into_inner(), payload.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(
        200,
        "Stream updated successfully",
        Some(stream.single_view(true)),
    )))
}

pub async fn attach_target(
    user: UserId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
    payload: web::Json<TargetRequest>,
) -> Result<HttpResponse> {
    let stream = state
        .lifecycle
        .attach_target(user.0, path.into_inner(), payload.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(
        200,
        "Multistream target attached",
        Some(stream.single_view(true)),
    )))
}

fn updated() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::<StreamSingleView>::success(
        200,
        "Information updated successfully",
        None,
    ))
}

pub async fn activate_stream(
    user: UserId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    state
        .lifecycle
        .activate_stream(Actor::User(user.0), path.into_inner())
        .await?;
    Ok(updated())
}

pub async fn suspend_stream(
    user: UserId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    state
        .lifecycle
        .suspend_stream(Actor::User(user.0), path.into_inner())
        .await?;
    Ok(updated())
}

pub async fn terminate_stream(
    user: UserId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    state
        .lifecycle
        .terminate_stream(Actor::User(user.0), path.into_inner())
        .await?;
    Ok(updated())
}

pub async fn delete_stream(
    user: UserId,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    state
        .lifecycle
        .delete_stream(Actor::User(user.0), path.into_inner())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
