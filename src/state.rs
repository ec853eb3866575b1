use std::sync::Arc;

use crate::db::{ProfileStore, StoryStore};
use crate::llm::{TextGeneration, VisionCapability};
use crate::story::{NarrativeComposer, VisionDescriber};

/// Everything a request needs, built once at startup and shared by clone.
/// Holds no per-request or mutable data.
#[derive(Clone)]
pub struct AppState {
    pub describer: VisionDescriber,
    pub composer: NarrativeComposer,
    pub profiles: Arc<dyn ProfileStore>,
    pub stories: Arc<dyn StoryStore>,
}

impl AppState {
    pub fn new(
        vision: Arc<dyn VisionCapability>,
        generation: Arc<dyn TextGeneration>,
        profiles: Arc<dyn ProfileStore>,
        stories: Arc<dyn StoryStore>,
    ) -> Self {
        AppState {
            describer: VisionDescriber::new(vision),
            composer: NarrativeComposer::new(generation),
            profiles,
            stories,
        }
    }
}
