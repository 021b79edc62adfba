//! MockProvider: deterministic bridge responses for testing
//!
//! Implements `LlmProvider` with a scripted sequence of behaviors, so the
//! coordinator and the REST service can be exercised without a model server.

use crate::provider::{LlmError, LlmProvider, LlmResult};
use crate::types::{Completion, GenerateRequest};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Mock behavior configuration
#[derive(Clone, Debug)]
pub enum MockBehavior {
    /// Return this text as the completion
    Text(String),
    /// Fail with a request error carrying this message
    Error(String),
    /// Fail as if the call timed out
    Timeout,
}

impl MockBehavior {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }
}

/// A sequence of behaviors; each call to `generate` pops the next one.
/// Once the sequence is exhausted the default behavior repeats.
pub struct MockProvider {
    name: String,
    model: String,
    behaviors: Mutex<VecDeque<MockBehavior>>,
    default_behavior: MockBehavior,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl MockProvider {
    /// Create a mock that always returns the same behavior
    pub fn constant(behavior: MockBehavior) -> Self {
        Self::build(Vec::new(), behavior)
    }

    /// Create a mock with a sequence of behaviors (consumed in order)
    pub fn sequence(behaviors: Vec<MockBehavior>) -> Self {
        Self::build(
            behaviors,
            MockBehavior::Error("mock: sequence exhausted".into()),
        )
    }

    fn build(behaviors: Vec<MockBehavior>, default_behavior: MockBehavior) -> Self {
        Self {
            name: "mock".into(),
            model: "mock-model".into(),
            behaviors: Mutex::new(behaviors.into()),
            default_behavior,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn named(mut self, name: impl Into<String>, model: impl Into<String>) -> Self {
        self.name = name.into();
        self.model = model.into();
        self
    }

    /// Number of `generate` calls made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        request: GenerateRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<Completion> {
        if cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return Err(LlmError::Cancelled);
        }
        if let Ok(mut log) = self.requests.lock() {
            log.push(request);
        }
        let behavior = self
            .behaviors
            .lock()
            .ok()
            .and_then(|mut b| b.pop_front())
            .unwrap_or_else(|| self.default_behavior.clone());

        match behavior {
            MockBehavior::Text(text) => Ok(Completion {
                text,
                model: self.model.clone(),
                ..Default::default()
            }),
            MockBehavior::Error(msg) => Err(LlmError::RequestFailed(msg)),
            MockBehavior::Timeout => Err(LlmError::Timeout(0)),
        }
    }

    async fn health(&self) -> LlmResult<Vec<String>> {
        Ok(vec![self.model.clone()])
    }
}
