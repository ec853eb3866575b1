use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, info, warn};

use crate::handlers::error_response;
use crate::models::{Identifier, UserProfile};
use crate::state::AppState;

fn identifier_from_path(raw: &str) -> Identifier {
    raw.parse::<i64>()
        .map(Identifier::Int)
        .unwrap_or_else(|_| Identifier::Text(raw.to_string()))
}

#[axum::debug_handler]
pub async fn update_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    payload: Result<Json<UserProfile>, JsonRejection>,
) -> Response {
    let Json(profile) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    let user_id = identifier_from_path(&user_id);
    match state.profiles.save(&user_id, &profile).await {
        Ok(()) => {
            info!("Stored profile for user {}", user_id);
            (StatusCode::OK, Json(json!({ "status": "success" }))).into_response()
        }
        Err(err) => {
            warn!("Profile update for user {} failed: {err}", user_id);
            error_response(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
        }
    }
}

#[axum::debug_handler]
pub async fn list_stories(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    match state.stories.stories_for_user(&user_id).await {
        Ok(stories) => (StatusCode::OK, Json(json!({ "stories": stories }))).into_response(),
        Err(err) => {
            error!("Listing stories for user {} failed: {err}", user_id);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::server::router;
    use crate::test_support::{test_state, RecordingGeneration, RecordingStories, ScriptedVision};

    fn offline_state() -> AppState {
        test_state(
            Arc::new(ScriptedVision::default()),
            Arc::new(RecordingGeneration::replying("[]")),
            Arc::new(RecordingStories::default()),
        )
    }

    #[test]
    fn numeric_path_ids_become_integers() {
        assert_eq!(identifier_from_path("17"), Identifier::Int(17));
        assert_eq!(identifier_from_path("u-17"), Identifier::from("u-17"));
    }

    #[tokio::test]
    async fn profile_update_without_database_is_unavailable() {
        let response = router(offline_state())
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/api/users/7")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name":"Asha","age":8}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn stories_list_is_empty_without_database() {
        let response = router(offline_state())
            .oneshot(
                Request::builder()
                    .uri("/api/stories/7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["stories"], serde_json::json!([]));
    }
}
