use std::sync::Arc;

use tracing::debug;

use crate::error::{StoryError, StoryResult};
use crate::llm::VisionCapability;

/// Turns one image reference into a description through the configured
/// vision capability. No retry and no default text on failure.
#[derive(Clone)]
pub struct VisionDescriber {
    vision: Arc<dyn VisionCapability>,
}

impl VisionDescriber {
    pub fn new(vision: Arc<dyn VisionCapability>) -> Self {
        VisionDescriber { vision }
    }

    pub async fn describe(&self, image_reference: &str) -> StoryResult<String> {
        let description = self.vision.describe(image_reference).await?;
        let description = description.trim();
        if description.is_empty() {
            return Err(StoryError::description_unavailable(
                image_reference,
                format!("{} returned an empty description", self.vision.provider()),
            ));
        }

        debug!(
            "Described {} via {} ({} chars)",
            image_reference,
            self.vision.provider(),
            description.chars().count()
        );
        Ok(description.to_string())
    }
}
