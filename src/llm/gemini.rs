use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::{Config, VISION_PROMPT};
use crate::error::{StoryError, StoryResult};
use crate::llm::capability::{GenerationRequest, TextGeneration, VisionCapability};
use crate::llm::media::{load_image, truncate_for_log};
use crate::utils::timing::log_capability_timing;

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

/// Gemini `generateContent` client serving both the vision and the story
/// generation capability.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    vision_model: String,
    temperature: f32,
    top_k: i32,
    top_p: f32,
    max_output_tokens: i32,
    safety_settings: String,
    vision_timeout: Duration,
    generation_timeout: Duration,
}

impl GeminiClient {
    pub fn new(http: Client, config: &Config) -> Self {
        GeminiClient {
            http,
            api_key: config.gemini_api_key.clone(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            vision_model: config.gemini_vision_model.clone(),
            temperature: config.gemini_temperature,
            top_k: config.gemini_top_k,
            top_p: config.gemini_top_p,
            max_output_tokens: config.gemini_max_output_tokens,
            safety_settings: config.gemini_safety_settings.clone(),
            vision_timeout: config.vision_timeout,
            generation_timeout: config.generation_timeout,
        }
    }

    fn redact_api_key(&self, text: &str) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    fn build_safety_settings(&self) -> Vec<Value> {
        let threshold = match self.safety_settings.as_str() {
            "permissive" => "OFF",
            _ => "BLOCK_MEDIUM_AND_ABOVE",
        };

        vec![
            json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
            json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
            json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
            json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
        ]
    }

    fn build_generation_payload(&self, request: &GenerationRequest) -> Value {
        json!({
            "systemInstruction": { "parts": [{ "text": request.system_prompt }] },
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": {
                "temperature": self.temperature,
                "topK": self.top_k,
                "topP": self.top_p,
                "maxOutputTokens": self.max_output_tokens,
                "responseMimeType": "application/json",
                "responseJsonSchema": request.response_schema,
            },
            "safetySettings": self.build_safety_settings(),
        })
    }

    fn build_vision_payload(&self, mime_type: &str, encoded: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "inlineData": { "mimeType": mime_type, "data": encoded } },
                    { "text": VISION_PROMPT }
                ]
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "topK": self.top_k,
                "topP": self.top_p,
                "maxOutputTokens": self.max_output_tokens,
            },
            "safetySettings": self.build_safety_settings(),
        })
    }

    async fn call_api(
        &self,
        model: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<GeminiResponse> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        if tracing::enabled!(tracing::Level::DEBUG) {
            let payload_summary = summarize_payload(payload);
            debug!(target: "llm.gemini", model = model, payload = %payload_summary);
        }

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|err| {
                let err_text = self.redact_api_key(&err.to_string());
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect()
                );
                anyhow!("Gemini request failed: {}", err_text)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&self.redact_api_key(&body));
            warn!("Gemini API error: status={}, body={}", status, body_summary);
            let detail = message.unwrap_or(body_summary);
            return Err(anyhow!(
                "Gemini request failed with status {}: {}",
                status,
                detail
            ));
        }

        let value = response
            .json::<GeminiResponse>()
            .await
            .map_err(|err| anyhow!("Gemini response could not be decoded: {}", err))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(target: "llm.gemini", model = model, response = %summarize_response(&value));
        }
        Ok(value)
    }
}

#[async_trait]
impl VisionCapability for GeminiClient {
    fn provider(&self) -> &'static str {
        "gemini"
    }

    async fn describe(&self, image_reference: &str) -> StoryResult<String> {
        let image = load_image(&self.http, image_reference, self.vision_timeout).await?;
        let payload = self.build_vision_payload(&image.mime_type, &image.to_base64());

        log_capability_timing("gemini", &self.vision_model, "describe_image", || async {
            let response = self
                .call_api(&self.vision_model, &payload, self.vision_timeout)
                .await?;
            Ok(extract_text_from_response(response))
        })
        .await
        .map_err(|err| StoryError::description_unavailable(image_reference, err.to_string()))
    }
}

#[async_trait]
impl TextGeneration for GeminiClient {
    fn provider(&self) -> &'static str {
        "gemini"
    }

    async fn generate(&self, request: &GenerationRequest) -> StoryResult<String> {
        let payload = self.build_generation_payload(request);

        log_capability_timing("gemini", &self.model, "weave_story", || async {
            let response = self
                .call_api(&self.model, &payload, self.generation_timeout)
                .await?;
            Ok(extract_text_from_response(response))
        })
        .await
        .map_err(|err| StoryError::GenerationUnavailable(err.to_string()))
    }
}

fn extract_text_from_response(response: GeminiResponse) -> String {
    // Only the first candidate is used.
    let Some(candidate) = response.candidates.unwrap_or_default().into_iter().next() else {
        return String::new();
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason != "STOP" {
            warn!("Gemini candidate finished with reason {}", reason);
        }
    }

    candidate
        .content
        .and_then(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| part.text)
        .collect::<String>()
}

fn summarize_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if payload.pointer("/systemInstruction").is_some() {
        summary.insert("systemInstruction".to_string(), json!(true));
    }

    if let Some(parts) = payload
        .pointer("/contents/0/parts")
        .and_then(|value| value.as_array())
    {
        let parts: Vec<Value> = parts
            .iter()
            .map(|part| {
                if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                    json!({ "text": truncate_for_log(text, 200) })
                } else if let Some(inline_data) = part.get("inlineData") {
                    let mime_type = inline_data
                        .get("mimeType")
                        .and_then(|value| value.as_str())
                        .unwrap_or("unknown");
                    let data_len = inline_data
                        .get("data")
                        .and_then(|value| value.as_str())
                        .map(|value| value.len())
                        .unwrap_or(0);
                    json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
                } else {
                    json!({ "unknownPart": true })
                }
            })
            .collect();
        summary.insert("parts".to_string(), Value::Array(parts));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    Value::Object(summary)
}

fn summarize_response(response: &GeminiResponse) -> Value {
    let candidates = response.candidates.as_deref().unwrap_or(&[]);
    let text_preview = candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .and_then(|content| content.parts.as_ref())
        .and_then(|parts| parts.iter().find_map(|part| part.text.as_deref()))
        .map(|text| truncate_for_log(text, 200));

    json!({
        "candidates": candidates.len(),
        "textPreview": text_preview
    })
}

pub(crate) fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Identifier, Scene};
    use crate::story::composer::parse_fragments;

    fn client() -> GeminiClient {
        let mut config = Config::for_tests();
        config.gemini_api_key = "secret-key".to_string();
        GeminiClient::new(Client::new(), &config)
    }

    #[test]
    fn generation_payload_requests_json_with_schema() {
        let request = GenerationRequest {
            system_prompt: "system".to_string(),
            prompt: "weave".to_string(),
            response_schema: json!({ "type": "array" }),
            scene_ids: vec![Identifier::Int(1)],
        };
        let payload = client().build_generation_payload(&request);

        assert_eq!(payload["systemInstruction"]["parts"][0]["text"], "system");
        assert_eq!(payload["contents"][0]["parts"][0]["text"], "weave");
        assert_eq!(
            payload["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(
            payload["generationConfig"]["responseJsonSchema"],
            json!({ "type": "array" })
        );
        assert_eq!(payload["safetySettings"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn vision_payload_puts_image_before_instruction() {
        let payload = client().build_vision_payload("image/png", "AAAA");
        let parts = payload["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["text"], VISION_PROMPT);
    }

    #[test]
    fn redacts_the_api_key() {
        assert_eq!(
            client().redact_api_key("bad key secret-key in url"),
            "bad key [redacted] in url"
        );
    }

    #[test]
    fn extracts_text_of_first_candidate_only() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "[{\"image_id\":1," }, { "text": "\"story_text\":\"x\"}]" }] }, "finishReason": "STOP" },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap();
        assert_eq!(
            extract_text_from_response(response),
            "[{\"image_id\":1,\"story_text\":\"x\"}]"
        );
    }

    #[test]
    fn parts_split_inside_a_string_are_joined_verbatim() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [
                    { "text": "[{\"image_id\":1,\"story_text\":\"The hero" },
                    { "text": " " },
                    { "text": "walked in.\"}]" }
                ] } }
            ]
        }))
        .unwrap();
        let raw = extract_text_from_response(response);
        assert_eq!(raw, "[{\"image_id\":1,\"story_text\":\"The hero walked in.\"}]");

        let scenes = vec![Scene {
            image_id: Identifier::Int(1),
            description: "A hall".to_string(),
            user_note: None,
        }];
        let fragments = parse_fragments(&raw, &scenes).unwrap();
        assert_eq!(fragments[0].story_text, "The hero walked in.");
    }

    #[test]
    fn error_body_prefers_api_message() {
        let (message, _) =
            summarize_error_body(r#"{"error":{"code":429,"message":"Resource exhausted"}}"#);
        assert_eq!(message.as_deref(), Some("Resource exhausted"));

        let (message, summary) = summarize_error_body("   ");
        assert!(message.is_none());
        assert_eq!(summary, "empty response body");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_generation_unavailable() {
        let request = GenerationRequest {
            system_prompt: String::new(),
            prompt: "weave".to_string(),
            response_schema: json!({}),
            scene_ids: Vec::new(),
        };
        let err = client().generate(&request).await.unwrap_err();
        assert!(matches!(err, StoryError::GenerationUnavailable(_)));
        assert!(!err.to_string().contains("secret-key"));
    }
}
