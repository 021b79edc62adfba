//! AIOS LLM - HTTP bridges to local and cloud text-generation services

pub mod gemini;
pub mod json;
pub mod mock;
pub mod ollama;
pub mod provider;
pub mod types;

pub use gemini::{GeminiEndpoint, GeminiProvider};
pub use json::extract_json_object;
pub use mock::{MockBehavior, MockProvider};
pub use ollama::OllamaProvider;
pub use provider::{LlmError, LlmProvider, LlmResult};
pub use tokio_util::sync::CancellationToken;
pub use types::*;
