use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use super::error_response;
use crate::models::ScanReport;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(scan_folder))
        .route("/cancel", post(cancel_scan))
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub path: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

async fn scan_folder(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanReport>, (StatusCode, String)> {
    let report = state
        .library
        .scan_folder(&request.path)
        .await
        .map_err(error_response)?;
    Ok(Json(report))
}

async fn cancel_scan(State(state): State<Arc<AppState>>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.library.cancel_scan(),
    })
}
