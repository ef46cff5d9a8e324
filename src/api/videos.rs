use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

use super::error_response;
use crate::models::VideoEntry;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cached_videos))
        .route("/:id", delete(remove_video))
        .route("/:id/play", post(play_video))
        .route("/:id/favorite", put(set_favorite))
}

pub fn folder_routes() -> Router<Arc<AppState>> {
    Router::new().route("/delete", post(delete_folder))
}

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub favorite: bool,
}

#[derive(Debug, Deserialize)]
pub struct FolderRequest {
    pub path: PathBuf,
}

async fn get_cached_videos(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VideoEntry>>, (StatusCode, String)> {
    let videos = state
        .library
        .get_cached_videos()
        .await
        .map_err(error_response)?;
    Ok(Json(videos))
}

async fn remove_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    state.library.remove_video(&id).await.map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn play_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<VideoEntry>, (StatusCode, String)> {
    let entry = state.library.play_video(&id).await.map_err(error_response)?;
    Ok(Json(entry))
}

async fn set_favorite(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<FavoriteRequest>,
) -> Result<Json<VideoEntry>, (StatusCode, String)> {
    let entry = state
        .library
        .set_favorite(&id, request.favorite)
        .await
        .map_err(error_response)?;
    Ok(Json(entry))
}

async fn delete_folder(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FolderRequest>,
) -> StatusCode {
    state.library.delete_folder_if_exists(&request.path).await;
    StatusCode::NO_CONTENT
}
