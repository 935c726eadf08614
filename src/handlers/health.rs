//! Liveness and readiness probes.

use crate::{db, AppState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::error;

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
}

/// Process is up; says nothing about dependencies.
async fn liveness() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "up",
            "version": env!("CARGO_PKG_VERSION"),
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
        .into_response()
}

/// Ready to serve traffic: the database must answer a ping.
async fn readiness(State(state): State<AppState>) -> Response {
    match db::check_connection(&state.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "database": "up",
                "timestamp": Utc::now().to_rfc3339(),
            })),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "not_ready",
                    "database": "down",
                    "timestamp": Utc::now().to_rfc3339(),
                })),
            )
                .into_response()
        }
    }
}
