//! Gemini cloud bridge: AI Studio (API key in query) or Vertex AI (bearer token)

use crate::provider::{with_cancel, LlmError, LlmProvider, LlmResult};
use crate::types::{Completion, GenerateRequest, Usage};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

/// Where requests go and how they authenticate.
#[derive(Clone, Debug)]
pub enum GeminiEndpoint {
    Studio {
        base_url: String,
        api_key: String,
    },
    Vertex {
        base_url: String,
        project: String,
        location: String,
        access_token: String,
    },
}

impl GeminiEndpoint {
    pub fn studio(api_key: impl Into<String>) -> Self {
        Self::Studio {
            base_url: GEMINI_API_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn vertex(
        project: impl Into<String>,
        location: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        let location = location.into();
        Self::Vertex {
            base_url: format!("https://{}-aiplatform.googleapis.com", location),
            project: project.into(),
            location,
            access_token: access_token.into(),
        }
    }

    /// Model resource URL, without the `:method` suffix.
    fn model_url(&self, model: &str) -> String {
        match self {
            Self::Studio { base_url, .. } => format!("{}/v1beta/models/{}", base_url, model),
            Self::Vertex { base_url, project, location, .. } => format!(
                "{}/v1/projects/{}/locations/{}/publishers/google/models/{}",
                base_url, project, location, model
            ),
        }
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Studio { api_key, .. } => builder.query(&[("key", api_key)]),
            Self::Vertex { access_token, .. } => builder.bearer_auth(access_token),
        }
    }
}

pub struct GeminiProvider {
    client: Client,
    endpoint: GeminiEndpoint,
    model: String,
    timeout: Duration,
}

impl GeminiProvider {
    pub fn new(endpoint: GeminiEndpoint, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            model: model.into(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Replace the endpoint root (tests, proxies).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        match &mut self.endpoint {
            GeminiEndpoint::Studio { base_url, .. } | GeminiEndpoint::Vertex { base_url, .. } => {
                *base_url = url
            }
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &GeminiEndpoint {
        &self.endpoint
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }

    async fn send(&self, body: &GeminiRequest) -> LlmResult<GeminiResponse> {
        let url = format!("{}:generateContent", self.endpoint.model_url(&self.model));
        debug!("Gemini request: model={}", self.model);

        let builder = self.client.post(&url).timeout(self.timeout).json(body);
        let response = self
            .endpoint
            .authorize(builder)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(e, self.timeout_ms()))?;

        if !response.status().is_success() {
            let e = LlmError::from_response(response).await;
            error!("Gemini error: {}", e);
            return Err(e);
        }

        response
            .json::<GeminiResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        match self.endpoint {
            GeminiEndpoint::Studio { .. } => "gemini",
            GeminiEndpoint::Vertex { .. } => "vertex",
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: GenerateRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<Completion> {
        let body = GeminiRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part { text: request.prompt }],
            }],
            system_instruction: request.system.map(|s| Content {
                role: None,
                parts: vec![Part { text: s }],
            }),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                response_mime_type: request.json.then(|| "application/json".to_string()),
            },
        };

        let started = Instant::now();
        let response = with_cancel(self.send(&body), cancel).await?;

        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no candidates".into()))?;
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(LlmError::InvalidResponse(format!(
                "empty candidate (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        let usage = response.usage_metadata.unwrap_or_default();
        Ok(Completion {
            text,
            model: self.model.clone(),
            usage: Usage {
                input_tokens: usage.prompt_token_count,
                output_tokens: usage.candidates_token_count,
            },
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn health(&self) -> LlmResult<Vec<String>> {
        let url = self.endpoint.model_url(&self.model);
        let builder = self.client.get(&url).timeout(self.timeout);
        let response = self
            .endpoint
            .authorize(builder)
            .send()
            .await
            .map_err(|e| LlmError::from_reqwest(e, self.timeout_ms()))?;
        if !response.status().is_success() {
            return Err(LlmError::from_response(response).await);
        }
        Ok(vec![self.model.clone()])
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn studio_model_url() {
        let e = GeminiEndpoint::studio("k");
        assert_eq!(
            e.model_url("gemini-2.5-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash"
        );
    }

    #[test]
    fn vertex_model_url() {
        let e = GeminiEndpoint::vertex("proj", "us-central1", "tok");
        assert_eq!(
            e.model_url("gemini-2.5-pro"),
            "https://us-central1-aiplatform.googleapis.com/v1/projects/proj/locations/us-central1/publishers/google/models/gemini-2.5-pro"
        );
    }

    #[test]
    fn request_uses_camel_case() {
        let body = GeminiRequest {
            contents: vec![Content { role: Some("user".into()), parts: vec![Part { text: "x".into() }] }],
            system_instruction: Some(Content { role: None, parts: vec![Part { text: "sys".into() }] }),
            generation_config: GenerationConfig {
                temperature: None,
                max_output_tokens: Some(10),
                response_mime_type: Some("application/json".into()),
            },
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(v["generationConfig"]["maxOutputTokens"], 10);
        assert_eq!(v["generationConfig"]["responseMimeType"], "application/json");
        assert!(v["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn provider_name_tracks_endpoint() {
        let p = GeminiProvider::new(GeminiEndpoint::vertex("p", "europe-west4", "t"), "m");
        assert_eq!(p.name(), "vertex");
        let p = GeminiProvider::new(GeminiEndpoint::studio("k"), "m");
        assert_eq!(p.name(), "gemini");
    }
}
