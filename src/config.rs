use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::warn;

use crate::models::UserProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    OpenRouter,
    Canned,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenRouter => "openrouter",
            Provider::Canned => "canned",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub log_dir: PathBuf,
    pub provider: Provider,
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub gemini_vision_model: String,
    pub gemini_temperature: f32,
    pub gemini_top_k: i32,
    pub gemini_top_p: f32,
    pub gemini_max_output_tokens: i32,
    pub gemini_safety_settings: String,
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub openrouter_model: String,
    pub openrouter_vision_model: String,
    pub openrouter_temperature: f32,
    pub vision_timeout: Duration,
    pub generation_timeout: Duration,
    pub database_url: String,
    pub default_profile: UserProfile,
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_i32(name: &str, default: i32) -> i32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_provider(value: &str) -> Result<Provider> {
    match value.trim().to_lowercase().as_str() {
        "gemini" => Ok(Provider::Gemini),
        "openrouter" => Ok(Provider::OpenRouter),
        "canned" | "mock" => Ok(Provider::Canned),
        other => Err(anyhow!(
            "Unknown LLM_PROVIDER '{other}'; expected gemini, openrouter or canned"
        )),
    }
}

fn normalize_gemini_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "standard".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to standard.",
                value
            );
            "standard".to_string()
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let bind_addr = env_string("BIND_ADDR", "127.0.0.1:5000");
        let bind_addr = bind_addr
            .parse::<SocketAddr>()
            .map_err(|err| anyhow!("Invalid BIND_ADDR '{bind_addr}': {err}"))?;

        let provider = parse_provider(&env_string("LLM_PROVIDER", "gemini"))?;
        let gemini_api_key = env_string("GEMINI_API_KEY", "");
        let openrouter_api_key = env_string("OPENROUTER_API_KEY", "");

        match provider {
            Provider::Gemini if gemini_api_key.trim().is_empty() => {
                return Err(anyhow!("GEMINI_API_KEY is required when LLM_PROVIDER=gemini"));
            }
            Provider::OpenRouter if openrouter_api_key.trim().is_empty() => {
                return Err(anyhow!(
                    "OPENROUTER_API_KEY is required when LLM_PROVIDER=openrouter"
                ));
            }
            _ => {}
        }

        let default_profile = UserProfile {
            name: env_string("DEFAULT_PROFILE_NAME", "John"),
            age: env_u32("DEFAULT_PROFILE_AGE", 25),
        };

        Ok(Config {
            bind_addr,
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            log_dir: PathBuf::from(env_string("LOG_DIR", "logs")),
            provider,
            gemini_api_key,
            gemini_base_url: env_string(
                "GEMINI_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            gemini_model: env_string("GEMINI_MODEL", "gemini-2.5-flash"),
            gemini_vision_model: env_string("GEMINI_VISION_MODEL", "gemini-2.5-flash"),
            gemini_temperature: env_f32("GEMINI_TEMPERATURE", 0.7),
            gemini_top_k: env_i32("GEMINI_TOP_K", 40),
            gemini_top_p: env_f32("GEMINI_TOP_P", 0.95),
            gemini_max_output_tokens: env_i32("GEMINI_MAX_OUTPUT_TOKENS", 4096),
            gemini_safety_settings: normalize_gemini_safety_settings(env_string(
                "GEMINI_SAFETY_SETTINGS",
                "standard",
            )),
            openrouter_api_key,
            openrouter_base_url: env_string("OPENROUTER_BASE_URL", "https://openrouter.ai/api/v1"),
            openrouter_model: env_string("OPENROUTER_MODEL", "openai/gpt-4o-mini"),
            openrouter_vision_model: env_string("OPENROUTER_VISION_MODEL", "openai/gpt-4o-mini"),
            openrouter_temperature: env_f32("OPENROUTER_TEMPERATURE", 0.7),
            vision_timeout: Duration::from_secs(env_u64("VISION_TIMEOUT_SECONDS", 60)),
            generation_timeout: Duration::from_secs(env_u64("GENERATION_TIMEOUT_SECONDS", 120)),
            database_url: env_string("DATABASE_URL", "").trim().to_string(),
            default_profile,
        })
    }

    /// Offline configuration backed by the canned provider and no database.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_level: "debug".to_string(),
            log_dir: PathBuf::from("logs"),
            provider: Provider::Canned,
            gemini_api_key: String::new(),
            gemini_base_url: "http://127.0.0.1:9/v1beta".to_string(),
            gemini_model: "gemini-test".to_string(),
            gemini_vision_model: "gemini-test".to_string(),
            gemini_temperature: 0.7,
            gemini_top_k: 40,
            gemini_top_p: 0.95,
            gemini_max_output_tokens: 1024,
            gemini_safety_settings: "standard".to_string(),
            openrouter_api_key: String::new(),
            openrouter_base_url: "http://127.0.0.1:9/api/v1".to_string(),
            openrouter_model: "test/model".to_string(),
            openrouter_vision_model: "test/vision".to_string(),
            openrouter_temperature: 0.7,
            vision_timeout: Duration::from_secs(5),
            generation_timeout: Duration::from_secs(5),
            database_url: String::new(),
            default_profile: UserProfile {
                name: "John".to_string(),
                age: 25,
            },
        }
    }
}

pub const STORY_SYSTEM_PROMPT: &str = "You are an award-winning children's book author. Write compelling, connected stories.";

pub const VISION_PROMPT: &str = "Describe the visual content of this image in two or three plain sentences. Mention the setting, the people or creatures present and what they are doing. Do not speculate beyond what is visible and do not use markdown.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_providers_case_insensitively() {
        assert_eq!(parse_provider("Gemini").unwrap(), Provider::Gemini);
        assert_eq!(parse_provider(" openrouter ").unwrap(), Provider::OpenRouter);
        assert_eq!(parse_provider("mock").unwrap(), Provider::Canned);
        assert!(parse_provider("bard").is_err());
    }

    #[test]
    fn unknown_safety_profile_falls_back_to_standard() {
        assert_eq!(normalize_gemini_safety_settings("off".to_string()), "permissive");
        assert_eq!(normalize_gemini_safety_settings("loose".to_string()), "standard");
        assert_eq!(normalize_gemini_safety_settings("  ".to_string()), "standard");
    }
}
