use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Reports whether the story store answers. Model providers are not probed.
#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthRes>) {
    match state.stories.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthRes {
                ok: true,
                message: "Story weaver is alive".into(),
            }),
        ),
        Err(err) => {
            warn!("Health check failed: {err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthRes {
                    ok: false,
                    message: format!("Story store unavailable: {err}"),
                }),
            )
        }
    }
}
