use std::sync::Arc;

use anyhow::Result;
use axum::routing::{get, post, put};
use axum::Router;
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{Config, Provider};
use crate::db::{Database, DefaultProfileStore, NoopStoryStore, ProfileStore, StoryStore};
use crate::handlers::{health, profile, story};
use crate::llm::{CannedProvider, GeminiClient, OpenRouterClient, TextGeneration, VisionCapability};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/generate-story", post(story::generate_story))
        .route("/api/users/:user_id", put(profile::update_profile))
        .route("/api/stories/:user_id", get(profile::list_stories))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn build_capabilities(
    config: &Config,
    http: Client,
) -> (Arc<dyn VisionCapability>, Arc<dyn TextGeneration>) {
    match config.provider {
        Provider::Gemini => {
            let client = Arc::new(GeminiClient::new(http, config));
            (client.clone(), client)
        }
        Provider::OpenRouter => {
            let client = Arc::new(OpenRouterClient::new(http, config));
            (client.clone(), client)
        }
        Provider::Canned => {
            let client = Arc::new(CannedProvider);
            (client.clone(), client)
        }
    }
}

/// Wires providers and stores from configuration. An empty `DATABASE_URL`
/// runs without persistence and answers every profile lookup with the
/// configured default.
pub async fn build_state(config: &Config, http: Client) -> Result<AppState> {
    let (vision, generation) = build_capabilities(config, http);
    info!("Using {} for vision and story generation", config.provider.as_str());

    let (profiles, stories): (Arc<dyn ProfileStore>, Arc<dyn StoryStore>) =
        if config.database_url.trim().is_empty() {
            info!("DATABASE_URL is empty; stories will not be persisted");
            (
                Arc::new(DefaultProfileStore::new(config.default_profile.clone())),
                Arc::new(NoopStoryStore),
            )
        } else {
            let database = Database::init(&config.database_url, config.default_profile.clone())
                .await?;
            let database = Arc::new(database);
            (database.clone(), database)
        };

    Ok(AppState::new(vision, generation, profiles, stories))
}

pub async fn serve(config: &Config, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Story weaver listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Story weaver stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn canned_state_generates_without_network() {
        let config = Config::for_tests();
        let state = build_state(&config, Client::new()).await.unwrap();

        let body = r#"{"user_id":"u1","images":[{"id":"p1","url":"a.jpg"},{"id":"p2","url":"b.jpg"}]}"#;
        let response = router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/generate-story")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn in_memory_database_is_wired_when_configured() {
        let mut config = Config::for_tests();
        config.database_url = "sqlite::memory:".to_string();
        let state = build_state(&config, Client::new()).await.unwrap();

        assert!(state.stories.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let state = build_state(&Config::for_tests(), Client::new()).await.unwrap();
        let response = router(state)
            .oneshot(Request::builder().uri("/api/unknown").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
