//! Capability and store doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::db::{DefaultProfileStore, ProfileStore, StoryStore};
use crate::error::{StoryError, StoryResult};
use crate::llm::{GenerationRequest, TextGeneration, VisionCapability};
use crate::models::{Identifier, StoryFragment, UserProfile};
use crate::state::AppState;

/// Vision double answering from a fixed table. `None` (or a missing entry)
/// fails the call.
#[derive(Default)]
pub struct ScriptedVision {
    descriptions: HashMap<String, Option<String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedVision {
    pub fn new(entries: &[(&str, Option<&str>)]) -> Self {
        ScriptedVision {
            descriptions: entries
                .iter()
                .map(|(reference, text)| (reference.to_string(), text.map(str::to_string)))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl VisionCapability for ScriptedVision {
    fn provider(&self) -> &'static str {
        "scripted"
    }

    async fn describe(&self, image_reference: &str) -> StoryResult<String> {
        self.calls.lock().push(image_reference.to_string());
        match self.descriptions.get(image_reference) {
            Some(Some(text)) => Ok(text.clone()),
            _ => Err(StoryError::description_unavailable(
                image_reference,
                "vision service unreachable",
            )),
        }
    }
}

/// Generation double that records every request and replies with a fixed
/// body or a transport failure.
pub struct RecordingGeneration {
    reply: std::result::Result<String, String>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl RecordingGeneration {
    pub fn replying(body: &str) -> Self {
        RecordingGeneration {
            reply: Ok(body.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        RecordingGeneration {
            reply: Err(reason.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl TextGeneration for RecordingGeneration {
    fn provider(&self) -> &'static str {
        "recording"
    }

    async fn generate(&self, request: &GenerationRequest) -> StoryResult<String> {
        self.requests.lock().push(request.clone());
        self.reply
            .clone()
            .map_err(StoryError::GenerationUnavailable)
    }
}

pub struct FailingProfiles;

#[async_trait]
impl ProfileStore for FailingProfiles {
    async fn resolve(&self, user_id: &Identifier) -> StoryResult<UserProfile> {
        Err(StoryError::ProfileResolutionFailure {
            user_id: user_id.clone(),
            reason: "profile store offline".to_string(),
        })
    }

    async fn save(&self, _user_id: &Identifier, _profile: &UserProfile) -> Result<()> {
        Err(anyhow!("profile store offline"))
    }
}

/// Story store double keeping everything it is handed.
#[derive(Default)]
pub struct RecordingStories {
    fail: bool,
    stored: Mutex<Vec<(Identifier, Vec<StoryFragment>)>>,
}

impl RecordingStories {
    pub fn failing() -> Self {
        RecordingStories {
            fail: true,
            stored: Mutex::new(Vec::new()),
        }
    }

    pub fn stored(&self) -> Vec<(Identifier, Vec<StoryFragment>)> {
        self.stored.lock().clone()
    }
}

#[async_trait]
impl StoryStore for RecordingStories {
    async fn queue_story(&self, user_id: &Identifier, fragments: &[StoryFragment]) -> Result<()> {
        if self.fail {
            return Err(anyhow!("story queue closed"));
        }
        self.stored.lock().push((user_id.clone(), fragments.to_vec()));
        Ok(())
    }
}

pub fn john() -> UserProfile {
    UserProfile {
        name: "John".to_string(),
        age: 25,
    }
}

pub fn test_state(
    vision: Arc<ScriptedVision>,
    generation: Arc<RecordingGeneration>,
    stories: Arc<RecordingStories>,
) -> AppState {
    AppState::new(
        vision,
        generation,
        Arc::new(DefaultProfileStore::new(john())),
        stories,
    )
}
