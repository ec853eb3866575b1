use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::STORY_SYSTEM_PROMPT;
use crate::error::{StoryError, StoryResult};
use crate::llm::media::truncate_for_log;
use crate::llm::{GenerationRequest, TextGeneration};
use crate::models::{Identifier, Scene, StoryFragment, UserProfile};

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n?(.*?)\s*```\s*$").expect("valid code-fence regex")
});
static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

#[derive(Debug, Deserialize)]
struct RawFragment {
    image_id: Identifier,
    story_text: String,
}

/// Weaves ordered scenes into one story through a single generation call.
#[derive(Clone)]
pub struct NarrativeComposer {
    generation: Arc<dyn TextGeneration>,
}

impl NarrativeComposer {
    pub fn new(generation: Arc<dyn TextGeneration>) -> Self {
        NarrativeComposer { generation }
    }

    /// Returns one fragment per scene, in scene order, or fails as a unit.
    /// An empty scene list yields an empty story without calling the model.
    pub async fn compose(
        &self,
        scenes: &[Scene],
        profile: &UserProfile,
    ) -> StoryResult<Vec<StoryFragment>> {
        if scenes.is_empty() {
            info!("No scenes to compose; returning an empty story");
            return Ok(Vec::new());
        }

        let request = build_request(scenes, profile);
        debug!(
            "Composing {} scene(s) via {} (prompt {} chars)",
            scenes.len(),
            self.generation.provider(),
            request.prompt.chars().count()
        );

        let raw = self.generation.generate(&request).await?;
        let fragments = parse_fragments(&raw, scenes).map_err(|err| {
            warn!(
                "Rejected generation output from {}: {} (raw={})",
                self.generation.provider(),
                err,
                truncate_for_log(&raw, 500)
            );
            err
        })?;

        info!("Composed story with {} fragment(s)", fragments.len());
        Ok(fragments)
    }
}

fn single_line(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text.trim(), " ").into_owned()
}

fn format_example(scenes: &[Scene]) -> String {
    let entries: Vec<String> = scenes
        .iter()
        .take(2)
        .map(|scene| {
            format!(
                "{{\"image_id\": {}, \"story_text\": \"...\"}}",
                scene.image_id.prompt_literal()
            )
        })
        .collect();
    format!("[{}]", entries.join(", "))
}

/// Renders the full prompt. A pure function of its inputs.
pub fn build_prompt(scenes: &[Scene], profile: &UserProfile) -> String {
    let mut prompt = format!(
        "ROLE: You are an award-winning author writing a storybook for {} (Age: {}).\n",
        single_line(&profile.name),
        profile.age
    );
    prompt.push_str("TASK: Weave the following scenes into one cohesive, flowing narrative.\n");
    prompt.push_str(&format!(
        "Adjust the vocabulary and tone to be appropriate and engaging for a {} year old reader.\n",
        profile.age
    ));

    prompt.push_str("\nSCENES:\n");
    for scene in scenes {
        prompt.push_str(&format!(
            "- Image {}: [Visual: {}] [User Note: {}]\n",
            scene.image_id.prompt_literal(),
            single_line(&scene.description),
            single_line(scene.user_note.as_deref().unwrap_or(""))
        ));
    }

    prompt.push_str("\nINSTRUCTIONS:\n");
    prompt.push_str("1. Output MUST be a valid JSON array and nothing else.\n");
    prompt.push_str(
        "2. Each element is an object with exactly two fields: \"image_id\" and \"story_text\".\n",
    );
    prompt.push_str(&format!(
        "3. Write exactly {} element(s), one per scene, in the same order as the scenes above. Copy each image_id exactly as it is written above.\n",
        scenes.len()
    ));
    prompt.push_str(
        "4. Ensure the text for each image flows seamlessly into the text for the next image.\n",
    );
    prompt.push_str(
        "5. Do not merely describe the images. Weave each one into the plot and use the user notes as story context.\n",
    );
    prompt.push_str(&format!("6. Format: {}\n", format_example(scenes)));
    prompt
}

fn image_id_schema(scenes: &[Scene]) -> Value {
    let has_int = scenes
        .iter()
        .any(|scene| matches!(scene.image_id, Identifier::Int(_)));
    let has_text = scenes
        .iter()
        .any(|scene| matches!(scene.image_id, Identifier::Text(_)));

    match (has_int, has_text) {
        (true, false) => json!({ "type": "integer" }),
        (false, true) => json!({ "type": "string" }),
        _ => json!({ "anyOf": [{ "type": "integer" }, { "type": "string" }] }),
    }
}

/// JSON schema of the expected output, for providers with structured output.
pub fn build_response_schema(scenes: &[Scene]) -> Value {
    json!({
        "type": "array",
        "minItems": scenes.len(),
        "maxItems": scenes.len(),
        "items": {
            "type": "object",
            "properties": {
                "image_id": image_id_schema(scenes),
                "story_text": { "type": "string" }
            },
            "required": ["image_id", "story_text"],
            "additionalProperties": false
        }
    })
}

pub fn build_request(scenes: &[Scene], profile: &UserProfile) -> GenerationRequest {
    GenerationRequest {
        system_prompt: STORY_SYSTEM_PROMPT.to_string(),
        prompt: build_prompt(scenes, profile),
        response_schema: build_response_schema(scenes),
        scene_ids: scenes.iter().map(|scene| scene.image_id.clone()).collect(),
    }
}

fn strip_code_fence(raw: &str) -> &str {
    match CODE_FENCE.captures(raw).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str(),
        None => raw.trim(),
    }
}

/// Parses raw model output against the scene list. Entry k must carry
/// scene k's image_id exactly.
pub fn parse_fragments(raw: &str, scenes: &[Scene]) -> StoryResult<Vec<StoryFragment>> {
    let body = strip_code_fence(raw);
    let value: Value = serde_json::from_str(body).map_err(|err| {
        StoryError::MalformedGenerationOutput(format!("response is not valid JSON: {err}"))
    })?;

    let Value::Array(entries) = value else {
        return Err(StoryError::MalformedGenerationOutput(
            "response is not a JSON array".to_string(),
        ));
    };

    if entries.len() != scenes.len() {
        return Err(StoryError::MalformedGenerationOutput(format!(
            "expected {} fragment(s), got {}",
            scenes.len(),
            entries.len()
        )));
    }

    let mut fragments = Vec::with_capacity(entries.len());
    for (index, (entry, scene)) in entries.into_iter().zip(scenes).enumerate() {
        let fragment: RawFragment = serde_json::from_value(entry).map_err(|err| {
            StoryError::MalformedGenerationOutput(format!("fragment {index} is invalid: {err}"))
        })?;

        if fragment.image_id != scene.image_id {
            return Err(StoryError::MalformedGenerationOutput(format!(
                "fragment {index} has image_id {}, expected {}",
                fragment.image_id.prompt_literal(),
                scene.image_id.prompt_literal()
            )));
        }

        fragments.push(StoryFragment {
            image_id: fragment.image_id,
            story_text: fragment.story_text,
        });
    }

    Ok(fragments)
}
