use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use std::sync::Arc;

use super::error_response;
use crate::models::Settings;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(load_settings).put(save_settings))
}

async fn load_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Settings>, (StatusCode, String)> {
    let settings = state.library.load_settings().await.map_err(error_response)?;
    Ok(Json(settings))
}

/// Replaces the whole record; omitted fields take their defaults
async fn save_settings(
    State(state): State<Arc<AppState>>,
    Json(settings): Json<Settings>,
) -> Result<Json<Settings>, (StatusCode, String)> {
    state
        .library
        .save_settings(&settings)
        .await
        .map_err(error_response)?;
    Ok(Json(settings))
}
