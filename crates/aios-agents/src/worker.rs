//! Worker tier: local model proposes the shortened replacement

use crate::error::AgentResult;
use aios_core::{LineRequest, ScoutSignal};
use aios_llm::{CancellationToken, GenerateRequest, LlmProvider};
use std::sync::Arc;
use tracing::debug;

const WORKER_SYSTEM_PROMPT: &str = "You rewrite single Python lines so they satisfy the line-length \
    limit. Keep behavior identical. Output only the replacement code, no explanations.";

/// Prose openers models put before the code.
const PREFACES: [&str; 6] = ["here", "sure", "fixed", "the fixed", "corrected", "replacement"];

/// Everything the worker sees for one attempt.
pub struct WorkerTask<'a> {
    pub request: &'a LineRequest,
    pub signal: &'a ScoutSignal,
    pub max_length: usize,
    /// Previous candidate and why it was sent back.
    pub revision: Option<(&'a str, &'a str)>,
}

pub struct Worker {
    provider: Arc<dyn LlmProvider>,
    temperature: f32,
    max_tokens: u32,
}

impl Worker {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider, temperature: 0.2, max_tokens: 512 }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub async fn generate(
        &self,
        task: &WorkerTask<'_>,
        cancel: Option<CancellationToken>,
    ) -> AgentResult<String> {
        let request = GenerateRequest::new(build_prompt(task))
            .system(WORKER_SYSTEM_PROMPT)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens);
        let completion = self.provider.generate(request, cancel).await?;
        debug!(
            "worker reply: {} chars in {}ms",
            completion.text.len(),
            completion.duration_ms
        );
        // An empty reply is a candidate like any other; validation asks for a retry.
        Ok(clean_response(&completion.text, &task.request.line))
    }
}

pub fn build_prompt(task: &WorkerTask<'_>) -> String {
    let mut prompt = String::new();
    let location = match (&task.request.file, task.request.line_number) {
        (Some(file), Some(n)) => format!("{}:{}", file, n),
        (Some(file), None) => file.clone(),
        _ => "<input>".to_string(),
    };
    prompt.push_str(&format!(
        "Location: {}\nViolation: {} ({})\nLimit: {} characters per line\n\nOriginal line:\n{}\n",
        location,
        task.signal.signal_type,
        task.signal.signal_type.description(),
        task.max_length,
        task.request.line
    ));
    if let Some((previous, feedback)) = task.revision {
        prompt.push_str(&format!(
            "\nYour previous attempt was sent back.\nPrevious attempt:\n{}\nFeedback: {}\n",
            previous, feedback
        ));
    }
    prompt.push_str(
        "\nReturn the replacement lines only. Keep the original indentation. \
         Use implicit continuation inside brackets where possible.",
    );
    prompt
}

/// Strip fences and prose, keep indentation consistent with the original.
pub fn clean_response(raw: &str, original: &str) -> String {
    let body = fenced_block(raw).unwrap_or(raw);

    let mut lines: Vec<&str> = body.lines().map(str::trim_end).collect();
    while lines.first().is_some_and(|l| l.trim().is_empty() || is_preface(l)) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }

    let indent: String = original.chars().take_while(|c| c.is_whitespace()).collect();
    let lost_indent = !indent.is_empty()
        && lines
            .first()
            .is_some_and(|l| !l.starts_with(char::is_whitespace));

    lines
        .iter()
        .map(|l| {
            if lost_indent && !l.is_empty() {
                format!("{}{}", indent, l)
            } else {
                l.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Contents of the first ``` fenced block, without the language tag.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(&body[..end])
}

fn is_preface(line: &str) -> bool {
    let lower = line.trim().to_ascii_lowercase();
    lower.ends_with(':') && PREFACES.iter().any(|p| lower.starts_with(p))
}
