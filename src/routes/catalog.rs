use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::db::catalog::{NewProgram, NewVideo};
use crate::db::tx::TransactionStatus;
use crate::error::AppError;
use crate::AppState;

use super::utils;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramPayload {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub version: Option<String>,
    pub download_url: Option<String>,
    pub external_download_url: Option<String>,
    pub icon_url: Option<String>,
    pub image_url: Option<String>,
    pub file_size: Option<String>,
    pub price: Option<Decimal>,
    pub is_paid: Option<bool>,
}

impl From<ProgramPayload> for NewProgram {
    fn from(payload: ProgramPayload) -> Self {
        NewProgram {
            title: payload.title,
            description: payload.description,
            category: payload.category.unwrap_or_else(|| "General".to_string()),
            version: payload.version,
            download_url: payload.download_url,
            external_download_url: payload.external_download_url,
            icon_url: payload.icon_url,
            image_url: payload.image_url,
            file_size: payload.file_size,
            price: payload.price.unwrap_or(Decimal::ZERO),
            is_paid: payload.is_paid.unwrap_or(false),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPayload {
    pub title: String,
    pub description: Option<String>,
    pub video_url: Option<String>,
    pub external_video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub program_id: Option<i32>,
}

impl From<VideoPayload> for NewVideo {
    fn from(payload: VideoPayload) -> Self {
        NewVideo {
            title: payload.title,
            description: payload.description,
            video_url: payload.video_url,
            external_video_url: payload.external_video_url,
            thumbnail_url: payload.thumbnail_url,
            program_id: payload.program_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub bill: Option<String>,
}

async fn list_programs(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let programs = state.catalog.list_programs().await?;
    Ok(Json(programs))
}

async fn get_program(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    let program = state.catalog.get_program(id).await?;
    Ok(Json(program))
}

async fn create_program(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(payload): Json<ProgramPayload>,
) -> Result<impl IntoResponse, AppError> {
    utils::require_admin(&headers, &state.auth)?;

    let program = state.catalog.create_program(payload.into()).await?;
    tracing::info!("program created: {} ({})", program.title, program.id);
    Ok((StatusCode::CREATED, Json(program)))
}

async fn update_program(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<ProgramPayload>,
) -> Result<impl IntoResponse, AppError> {
    utils::require_admin(&headers, &state.auth)?;

    let program = state.catalog.update_program(id, payload.into()).await?;
    tracing::info!("program updated: {}", id);
    Ok(Json(program))
}

async fn delete_program(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    utils::require_admin(&headers, &state.auth)?;

    state.catalog.delete_program(id).await?;
    tracing::info!("program deleted: {}", id);
    Ok(Json(serde_json::json!({ "message": "Program deleted" })))
}

// Free items resolve immediately; paid items need a settled bill.
async fn download_program(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<DownloadQuery>,
) -> Result<impl IntoResponse, AppError> {
    let program = state.catalog.get_program(id).await?;

    if program.is_paid {
        let bill = query.bill.ok_or(AppError::Unauthorized)?;
        let transaction = state.transactions.find_by_bill(&bill).await?;
        if transaction.program_id != id || transaction.status != TransactionStatus::Success {
            tracing::warn!("download of paid program {id} refused for bill {bill}");
            return Err(AppError::Unauthorized);
        }
    }

    let locator = program
        .download_locator()
        .ok_or(AppError::NotFound("Download"))?
        .to_string();

    state.catalog.increment_downloads(id).await?;
    Ok(Json(serde_json::json!({ "downloadUrl": locator })))
}

async fn list_videos(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let videos = state.catalog.list_videos().await?;
    Ok(Json(videos))
}

async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    state.catalog.increment_views(id).await?;
    let video = state.catalog.get_video(id).await?;
    Ok(Json(video))
}

async fn create_video(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(payload): Json<VideoPayload>,
) -> Result<impl IntoResponse, AppError> {
    utils::require_admin(&headers, &state.auth)?;

    let video = state.catalog.create_video(payload.into()).await?;
    tracing::info!("video created: {} ({})", video.title, video.id);
    Ok((StatusCode::CREATED, Json(video)))
}

async fn update_video(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<VideoPayload>,
) -> Result<impl IntoResponse, AppError> {
    utils::require_admin(&headers, &state.auth)?;

    let video = state.catalog.update_video(id, payload.into()).await?;
    Ok(Json(video))
}

async fn delete_video(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    utils::require_admin(&headers, &state.auth)?;

    state.catalog.delete_video(id).await?;
    Ok(Json(serde_json::json!({ "message": "Video deleted" })))
}

pub fn catalog_routes(state: AppState) -> Router {
    Router::new()
        .route("/programs", get(list_programs).post(create_program))
        .route(
            "/programs/:id",
            get(get_program).put(update_program).delete(delete_program),
        )
        .route("/programs/:id/download", get(download_program))
        .route("/videos", get(list_videos).post(create_video))
        .route(
            "/videos/:id",
            get(get_video).put(update_video).delete(delete_video),
        )
        .with_state(state)
}
