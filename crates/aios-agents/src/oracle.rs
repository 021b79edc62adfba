//! Oracle tier: cloud model arbitrates the worker's candidate

use crate::error::{AgentError, AgentResult};
use aios_core::{OracleDecision, OracleVerdict, ScoutSignal};
use aios_llm::{extract_json_object, CancellationToken, GenerateRequest, LlmProvider};
use std::sync::Arc;
use tracing::debug;

const ORACLE_SYSTEM_PROMPT: &str = "You are the final reviewer of automated Python line-length \
    fixes. Judge whether the candidate preserves the original's behavior and satisfies the limit. \
    Reply with one JSON object only.";

pub struct Oracle {
    provider: Arc<dyn LlmProvider>,
    temperature: f32,
    max_tokens: u32,
}

impl Oracle {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider, temperature: 0.1, max_tokens: 1024 }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub async fn validate(
        &self,
        original: &str,
        candidate: &str,
        signal: &ScoutSignal,
        max_length: usize,
        cancel: Option<CancellationToken>,
    ) -> AgentResult<OracleVerdict> {
        let request = GenerateRequest::new(build_prompt(original, candidate, signal, max_length))
            .system(ORACLE_SYSTEM_PROMPT)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .json();
        let completion = self.provider.generate(request, cancel).await?;
        let verdict = parse_verdict(&completion.text)?;
        debug!("oracle verdict: {:?} ({:.2})", verdict.decision, verdict.confidence);
        Ok(verdict)
    }
}

fn build_prompt(original: &str, candidate: &str, signal: &ScoutSignal, max_length: usize) -> String {
    format!(
        "Violation: {} (limit {} characters)\n\nOriginal:\n{}\n\nCandidate:\n{}\n\n\
         Respond as {{\"decision\": \"APPROVE\" | \"REJECT\" | \"REVISE\", \"confidence\": <0..1>, \
         \"feedback\": \"<what to change>\", \"issues\": [\"...\"], \"semantic_preserved\": true | false}}",
        signal.signal_type, max_length, original, candidate
    )
}

/// Parse the oracle's JSON verdict, leniently.
///
/// `APPROVE` with `semantic_preserved: false` is downgraded to `REVISE`.
pub fn parse_verdict(text: &str) -> AgentResult<OracleVerdict> {
    let value = extract_json_object(text)
        .ok_or_else(|| AgentError::Unparseable(truncate(text, 200)))?;

    let decision: OracleDecision = value
        .get("decision")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AgentError::Unparseable("missing decision".into()))?
        .parse()
        .map_err(AgentError::Unparseable)?;

    let confidence = value
        .get("confidence")
        .and_then(|v| v.as_f64())
        .map(|c| (c as f32).clamp(0.0, 1.0))
        .unwrap_or(0.0);
    let mut feedback = value
        .get("feedback")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let issues = match value.get("issues") {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|i| i.as_str().map(str::to_string))
            .collect(),
        Some(serde_json::Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    };
    let semantic_preserved = value
        .get("semantic_preserved")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    let decision = if decision == OracleDecision::Approve && !semantic_preserved {
        if feedback.is_empty() {
            feedback = "behavior changed; keep the original semantics".into();
        }
        OracleDecision::Revise
    } else {
        decision
    };

    Ok(OracleVerdict { decision, confidence, feedback, issues, semantic_preserved })
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_schema() {
        let v = parse_verdict(
            r#"{"decision":"REVISE","confidence":0.7,"feedback":"wrap args","issues":["too long"],"semantic_preserved":true}"#,
        )
        .unwrap();
        assert_eq!(v.decision, OracleDecision::Revise);
        assert_eq!(v.feedback, "wrap args");
        assert_eq!(v.issues, vec!["too long".to_string()]);
    }

    #[test]
    fn lowercase_decision_and_string_issue() {
        let v = parse_verdict(r#"```json
{"decision": "approve", "issues": "none really"}
```"#)
        .unwrap();
        assert_eq!(v.decision, OracleDecision::Approve);
        assert_eq!(v.issues.len(), 1);
        assert_eq!(v.confidence, 0.0);
    }

    #[test]
    fn approve_without_semantics_becomes_revise() {
        let v = parse_verdict(r#"{"decision":"APPROVE","semantic_preserved":false}"#).unwrap();
        assert_eq!(v.decision, OracleDecision::Revise);
        assert!(!v.feedback.is_empty());
    }

    #[test]
    fn garbage_is_unparseable() {
        assert!(matches!(parse_verdict("LGTM!"), Err(AgentError::Unparseable(_))));
        assert!(matches!(
            parse_verdict(r#"{"decision":"MAYBE"}"#),
            Err(AgentError::Unparseable(_))
        ));
    }
}
