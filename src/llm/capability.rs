use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::StoryResult;
use crate::models::Identifier;

/// One complete text-generation request. Built deterministically from the
/// scenes and profile, so identical inputs serialize to identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub prompt: String,
    pub response_schema: Value,
    pub scene_ids: Vec<Identifier>,
}

#[async_trait]
pub trait VisionCapability: Send + Sync {
    fn provider(&self) -> &'static str;

    /// Returns the raw description text for the referenced image.
    async fn describe(&self, image_reference: &str) -> StoryResult<String>;
}

#[async_trait]
pub trait TextGeneration: Send + Sync {
    fn provider(&self) -> &'static str;

    /// Returns the raw model output; parsing is the caller's job.
    async fn generate(&self, request: &GenerationRequest) -> StoryResult<String>;
}
