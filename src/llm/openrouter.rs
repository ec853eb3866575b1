use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::{Config, VISION_PROMPT};
use crate::error::{StoryError, StoryResult};
use crate::llm::capability::{GenerationRequest, TextGeneration, VisionCapability};
use crate::llm::gemini::summarize_error_body;
use crate::llm::media::{load_image, truncate_for_log};
use crate::utils::timing::log_capability_timing;

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think-block regex"));

/// OpenRouter chat-completions client serving both capabilities.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    vision_model: String,
    temperature: f32,
    vision_timeout: Duration,
    generation_timeout: Duration,
}

fn summarize_payload(payload: &Value) -> String {
    let model = payload
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let message_count = payload
        .get("messages")
        .and_then(|v| v.as_array())
        .map(|messages| messages.len())
        .unwrap_or(0);

    format!("model={}, messages={}", model, message_count)
}

/// Drops `<think>` reasoning blocks some models prepend to their answer.
fn strip_reasoning(content: &str) -> String {
    THINK_BLOCK.replace_all(content, "").trim().to_string()
}

fn extract_message_content(response: &Value) -> Option<String> {
    response
        .get("choices")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("message"))
        .and_then(|v| v.get("content"))
        .and_then(|v| v.as_str())
        .map(strip_reasoning)
}

impl OpenRouterClient {
    pub fn new(http: Client, config: &Config) -> Self {
        OpenRouterClient {
            http,
            api_key: config.openrouter_api_key.clone(),
            base_url: config.openrouter_base_url.trim_end_matches('/').to_string(),
            model: config.openrouter_model.clone(),
            vision_model: config.openrouter_vision_model.clone(),
            temperature: config.openrouter_temperature,
            vision_timeout: config.vision_timeout,
            generation_timeout: config.generation_timeout,
        }
    }

    fn build_generation_payload(&self, request: &GenerationRequest) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.prompt }
            ],
            "temperature": self.temperature,
        })
    }

    fn build_vision_payload(&self, data_url: &str) -> Value {
        json!({
            "model": self.vision_model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": VISION_PROMPT },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }],
            "temperature": self.temperature,
        })
    }

    async fn call_api(&self, payload: &Value, timeout: Duration) -> Result<Value> {
        debug!("OpenRouter request: {}", summarize_payload(payload));

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("X-Title", "StoryWeaver")
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                warn!(
                    "OpenRouter request failed to send: {} (timeout={}, connect={})",
                    err,
                    err.is_timeout(),
                    err.is_connect()
                );
                anyhow!("OpenRouter request failed: {}", err)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!(
                "OpenRouter API error: status={}, body={}",
                status, body_summary
            );
            let detail = message.unwrap_or(body_summary);
            return Err(anyhow!(
                "OpenRouter request failed with status {}: {}",
                status,
                detail
            ));
        }

        let value = response
            .json::<Value>()
            .await
            .map_err(|err| anyhow!("OpenRouter response could not be decoded: {}", err))?;
        if let Some(message) = value.pointer("/error/message").and_then(|v| v.as_str()) {
            return Err(anyhow!("OpenRouter returned an error: {}", message));
        }
        debug!(
            "OpenRouter response received: {}",
            truncate_for_log(&value.to_string(), 500)
        );
        Ok(value)
    }
}

#[async_trait]
impl VisionCapability for OpenRouterClient {
    fn provider(&self) -> &'static str {
        "openrouter"
    }

    async fn describe(&self, image_reference: &str) -> StoryResult<String> {
        let image = load_image(&self.http, image_reference, self.vision_timeout).await?;
        let payload = self.build_vision_payload(&image.to_data_url());

        log_capability_timing("openrouter", &self.vision_model, "describe_image", || async {
            let response = self.call_api(&payload, self.vision_timeout).await?;
            Ok(extract_message_content(&response).unwrap_or_default())
        })
        .await
        .map_err(|err| StoryError::description_unavailable(image_reference, err.to_string()))
    }
}

#[async_trait]
impl TextGeneration for OpenRouterClient {
    fn provider(&self) -> &'static str {
        "openrouter"
    }

    async fn generate(&self, request: &GenerationRequest) -> StoryResult<String> {
        let payload = self.build_generation_payload(request);

        log_capability_timing("openrouter", &self.model, "weave_story", || async {
            let response = self.call_api(&payload, self.generation_timeout).await?;
            extract_message_content(&response)
                .ok_or_else(|| anyhow!("OpenRouter response had no message content"))
        })
        .await
        .map_err(|err| StoryError::GenerationUnavailable(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identifier;

    fn client() -> OpenRouterClient {
        OpenRouterClient::new(Client::new(), &Config::for_tests())
    }

    #[test]
    fn strips_think_blocks_across_lines() {
        let content = "<think>\nplan the story\n</think>\n[{\"image_id\":1,\"story_text\":\"x\"}]";
        assert_eq!(
            strip_reasoning(content),
            "[{\"image_id\":1,\"story_text\":\"x\"}]"
        );
        assert_eq!(strip_reasoning("  plain  "), "plain");
    }

    #[test]
    fn reads_first_choice_content() {
        let response = json!({
            "choices": [{ "message": { "role": "assistant", "content": "[]" } }]
        });
        assert_eq!(extract_message_content(&response).as_deref(), Some("[]"));
        assert_eq!(extract_message_content(&json!({ "choices": [] })), None);
    }

    #[test]
    fn generation_payload_sends_system_then_user() {
        let request = GenerationRequest {
            system_prompt: "persona".to_string(),
            prompt: "scenes".to_string(),
            response_schema: json!({}),
            scene_ids: vec![Identifier::Int(1)],
        };
        let payload = client().build_generation_payload(&request);
        assert_eq!(payload["model"], "test/model");
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "scenes");
    }

    #[test]
    fn vision_payload_uses_vision_model_and_data_url() {
        let payload = client().build_vision_payload("data:image/png;base64,AAAA");
        assert_eq!(payload["model"], "test/vision");
        assert_eq!(
            payload["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );
    }
}
