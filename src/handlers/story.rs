use std::collections::HashSet;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{StoryError, StoryResult};
use crate::handlers::error_response;
use crate::models::{Identifier, Scene, StoryFragment};
use crate::state::AppState;
use crate::utils::timing::{complete_request_timer, start_request_timer};

#[derive(Debug, Clone, Deserialize)]
pub struct ImageInput {
    pub id: Identifier,
    pub url: String,
    #[serde(default)]
    pub user_context: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateStoryRequest {
    pub user_id: Identifier,
    pub images: Vec<ImageInput>,
}

#[derive(Debug, Serialize)]
struct StorySuccess {
    status: &'static str,
    story: Vec<StoryFragment>,
}

fn ensure_unique_ids(images: &[ImageInput]) -> StoryResult<()> {
    let mut seen = HashSet::with_capacity(images.len());
    for image in images {
        if !seen.insert(&image.id) {
            return Err(StoryError::InvalidRequest(format!(
                "image id {} appears more than once",
                image.id.prompt_literal()
            )));
        }
    }
    Ok(())
}

/// Describes every image in order, resolves the profile and weaves the
/// story. The first failure aborts the request; nothing partial is returned.
pub async fn handle(
    state: &AppState,
    request: GenerateStoryRequest,
) -> StoryResult<Vec<StoryFragment>> {
    ensure_unique_ids(&request.images)?;

    let mut scenes = Vec::with_capacity(request.images.len());
    for image in request.images {
        let description = state.describer.describe(&image.url).await?;
        scenes.push(Scene {
            image_id: image.id,
            description,
            user_note: image.user_context,
        });
    }

    let profile = state.profiles.resolve(&request.user_id).await?;
    let story = state.composer.compose(&scenes, &profile).await?;

    if !story.is_empty() {
        if let Err(err) = state.stories.queue_story(&request.user_id, &story).await {
            warn!("Story for user {} was not persisted: {err}", request.user_id);
        }
    }

    Ok(story)
}

#[axum::debug_handler]
pub async fn generate_story(
    State(state): State<AppState>,
    payload: Result<Json<GenerateStoryRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!("Rejected generate-story body: {}", rejection.body_text());
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let mut timer = start_request_timer(
        "generate_story",
        Some(&request.user_id),
        request.images.len(),
    );
    let user_id = request.user_id.clone();

    match handle(&state, request).await {
        Ok(story) => {
            info!("Generated story for user {} ({} pages)", user_id, story.len());
            complete_request_timer(&mut timer, "success", None);
            (
                StatusCode::OK,
                Json(StorySuccess {
                    status: "success",
                    story,
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!("Story generation failed for user {}: {err}", user_id);
            complete_request_timer(&mut timer, "error", Some(err.kind().to_string()));
            error_response(err.status_code(), err.to_string())
        }
    }
}
