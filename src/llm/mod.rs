pub mod canned;
pub mod capability;
pub mod gemini;
pub mod media;
pub mod openrouter;

pub use canned::CannedProvider;
pub use capability::{GenerationRequest, TextGeneration, VisionCapability};
pub use gemini::GeminiClient;
pub use openrouter::OpenRouterClient;
