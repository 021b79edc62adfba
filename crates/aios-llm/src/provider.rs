//! LLM Provider trait

use crate::types::{Completion, GenerateRequest};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Wait assumed when a 429 carries no usable `Retry-After`.
const DEFAULT_RETRY_AFTER_MS: u64 = 60_000;

/// Result type for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// LLM error types
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("timed out after {0}ms")]
    Timeout(u64),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("cancelled")]
    Cancelled,

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl LlmError {
    /// Map a non-success HTTP status and body to an error.
    pub fn from_status(status: reqwest::StatusCode, retry_after_ms: Option<u64>, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => LlmError::AuthFailed(body),
            404 => LlmError::ModelNotFound(body),
            429 => LlmError::RateLimited {
                retry_after_ms: retry_after_ms.unwrap_or(DEFAULT_RETRY_AFTER_MS),
            },
            _ => LlmError::RequestFailed(format!("{}: {}", status, body)),
        }
    }

    /// Consume a non-success response, honoring its `Retry-After` header.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let retry_after = retry_after_ms(response.headers());
        let body = response.text().await.unwrap_or_default();
        Self::from_status(status, retry_after, body)
    }

    pub(crate) fn from_reqwest(e: reqwest::Error, timeout_ms: u64) -> Self {
        if e.is_timeout() {
            LlmError::Timeout(timeout_ms)
        } else {
            LlmError::NetworkError(e)
        }
    }
}

/// `Retry-After` as delay-seconds or an HTTP date, in milliseconds from now.
pub fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let value = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }
    let at = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let wait = at.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(wait.num_milliseconds().max(0) as u64)
}

/// LLM Provider trait
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Bridge name, e.g. "ollama" or "gemini".
    fn name(&self) -> &str;

    /// Model this bridge sends requests to.
    fn model(&self) -> &str;

    /// One non-streaming completion. If `cancel` is triggered the in-flight
    /// request is dropped and `LlmError::Cancelled` is returned.
    async fn generate(
        &self,
        request: GenerateRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<Completion>;

    /// Probe the backend; returns the model names it reports.
    async fn health(&self) -> LlmResult<Vec<String>>;
}

/// Race a request future against an optional cancellation token.
pub(crate) async fn with_cancel<T>(
    fut: impl Future<Output = LlmResult<T>>,
    cancel: Option<CancellationToken>,
) -> LlmResult<T> {
    match cancel {
        Some(token) => tokio::select! {
            result = fut => result,
            _ = token.cancelled() => Err(LlmError::Cancelled),
        },
        None => fut.await,
    }
}
