//! Ollama-compatible local inference bridge (`/api/generate`, `/api/chat`, `/api/tags`)

use crate::provider::{with_cancel, LlmError, LlmProvider, LlmResult};
use crate::types::{ChatMessage, Completion, GenerateRequest, Usage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: OLLAMA_DEFAULT_URL.to_string(),
            model: model.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    /// Multi-turn completion through `/api/chat`.
    pub async fn chat(
        &self,
        messages: Vec<ChatMessage>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> LlmResult<Completion> {
        let body = ChatBody {
            model: &self.model,
            messages,
            stream: false,
            options: Options { temperature, num_predict: max_tokens },
        };
        let started = Instant::now();
        let response: ChatResponse = self.post_json("/api/chat", &body).await?;
        Ok(Completion {
            text: response.message.content,
            model: response.model.unwrap_or_else(|| self.model.clone()),
            usage: Usage {
                input_tokens: response.prompt_eval_count.unwrap_or(0),
                output_tokens: response.eval_count.unwrap_or(0),
            },
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Installed models as reported by `/api/tags`.
    pub async fn tags(&self) -> LlmResult<Vec<ModelTag>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(e, self.timeout_ms()))?;
        if !response.status().is_success() {
            return Err(LlmError::from_response(response).await);
        }
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(tags.models)
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> LlmResult<R> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Ollama request: {} model={}", path, self.model);

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(e, self.timeout_ms()))?;

        if !response.status().is_success() {
            let e = LlmError::from_response(response).await;
            error!("Ollama error: {}", e);
            return Err(e);
        }

        response
            .json::<R>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: GenerateRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<Completion> {
        let body = GenerateBody {
            model: &self.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream: false,
            format: request.json.then_some("json"),
            options: Options {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let started = Instant::now();
        let response: GenerateResponse =
            with_cancel(self.post_json("/api/generate", &body), cancel).await?;

        if !response.done.unwrap_or(true) {
            return Err(LlmError::InvalidResponse("generation not finished".into()));
        }

        Ok(Completion {
            text: response.response,
            model: response.model.unwrap_or_else(|| self.model.clone()),
            usage: Usage {
                input_tokens: response.prompt_eval_count.unwrap_or(0),
                output_tokens: response.eval_count.unwrap_or(0),
            },
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn health(&self) -> LlmResult<Vec<String>> {
        Ok(self.tags().await?.into_iter().map(|t| t.name).collect())
    }
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
    options: Options,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: Options,
}

#[derive(Serialize)]
struct Options {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    model: Option<String>,
    response: String,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    message: ChatMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

/// One entry of `/api/tags`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelTag {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: Option<String>,
}
