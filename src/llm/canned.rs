use async_trait::async_trait;
use serde_json::json;

use crate::error::StoryResult;
use crate::llm::capability::{GenerationRequest, TextGeneration, VisionCapability};

/// Offline provider used for local runs without model credentials.
/// Descriptions and stories are derived from the inputs only.
#[derive(Debug, Clone, Default)]
pub struct CannedProvider;

#[async_trait]
impl VisionCapability for CannedProvider {
    fn provider(&self) -> &'static str {
        "canned"
    }

    async fn describe(&self, image_reference: &str) -> StoryResult<String> {
        Ok(format!("A description of the image at {image_reference}"))
    }
}

#[async_trait]
impl TextGeneration for CannedProvider {
    fn provider(&self) -> &'static str {
        "canned"
    }

    async fn generate(&self, request: &GenerationRequest) -> StoryResult<String> {
        let fragments: Vec<_> = request
            .scene_ids
            .iter()
            .map(|image_id| {
                json!({
                    "image_id": image_id,
                    "story_text": format!(
                        "This is the generated story for image {image_id}. It connects to the next scene by..."
                    ),
                })
            })
            .collect();
        Ok(serde_json::Value::Array(fragments).to_string())
    }
}
