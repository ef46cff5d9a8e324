use axum::{http::StatusCode, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::Error;
use crate::AppState;

mod scan;
mod settings;
mod videos;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/scan", scan::routes())
        .nest("/videos", videos::routes())
        .nest("/folders", videos::folder_routes())
        .nest("/settings", settings::routes())
}

/// Full command API with tracing and permissive CORS for a local UI
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Map a core error onto an HTTP status and message
pub(crate) fn error_response(err: Error) -> (StatusCode, String) {
    let status = match &err {
        Error::Io { .. } | Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::ScanInProgress => StatusCode::CONFLICT,
        Error::Launch(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Storage(_) | Error::Extraction { .. } | Error::ExternalLookup(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    if status.is_server_error() {
        tracing::error!("{}", err);
    } else {
        tracing::debug!("{}", err);
    }
    (status, err.to_string())
}
