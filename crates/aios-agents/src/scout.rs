//! Scout tier: fast classification of an overlong line
//!
//! The regex fast path answers the common shapes without a model call. Anything
//! else goes to the small local model, which must answer with JSON. A model
//! failure never stops the pipeline: the scout degrades to a keyword heuristic.

use aios_core::{LineRequest, ScoutSignal, SignalType};
use aios_llm::{extract_json_object, CancellationToken, GenerateRequest, LlmProvider};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

const SCOUT_SYSTEM_PROMPT: &str = "You are a fast code classifier. You label Python lines that \
    exceed the line-length limit. Answer with a single JSON object and nothing else.";

/// Confidence given to heuristic labels when the model is unavailable.
const HEURISTIC_CONFIDENCE: f32 = 0.3;
/// Confidence assumed when the model omits one.
const DEFAULT_MODEL_CONFIDENCE: f32 = 0.7;

/// Regex classifier run before any model call.
pub struct FastPath {
    rules: Vec<(Regex, SignalType, &'static str)>,
}

impl FastPath {
    pub fn new() -> Self {
        let rule = |pattern: &str, signal: SignalType, why: &'static str| {
            // Patterns are constant; a failure here is a programming error caught by tests.
            Regex::new(pattern).map(|re| (re, signal, why))
        };
        let rules = [
            rule(r"^\s*#", SignalType::Comment, "full-line comment"),
            rule(r#"^\s*[rRuU]?("""|''')"#, SignalType::Docstring, "docstring line"),
            rule(
                r"^\s*(?:from\s+[\w.]+\s+import\b|import\s+[\w.]+)",
                SignalType::Import,
                "import statement",
            ),
            rule(r"^\s*(?:async\s+)?def\s+\w+\s*\(", SignalType::FunctionDef, "function signature"),
            rule(
                r#"^\s*[A-Za-z_][\w.]*\s*(?::\s*[\w\[\], .|]+)?\s*\+?=\s*(?:[rR]?[fF]|[fF][rR])["']"#,
                SignalType::FString,
                "f-string assignment",
            ),
            rule(
                r#"^\s*[A-Za-z_][\w.]*\s*(?::\s*[\w\[\], .|]+)?\s*\+?=\s*(?:[rRbBuU]{1,2})?["']"#,
                SignalType::String,
                "string literal assignment",
            ),
        ];
        Self {
            rules: rules.into_iter().filter_map(Result::ok).collect(),
        }
    }

    pub fn classify(&self, line: &str) -> Option<ScoutSignal> {
        self.rules
            .iter()
            .find(|(re, _, _)| re.is_match(line))
            .map(|(_, signal, why)| ScoutSignal::fast(*signal, format!("fast path: {}", why)))
    }
}

impl Default for FastPath {
    fn default() -> Self {
        Self::new()
    }
}

/// Scout output plus what it cost.
#[derive(Clone, Debug)]
pub struct Classification {
    pub signal: ScoutSignal,
    /// Whether the scout model was called.
    pub called_model: bool,
    pub error: Option<String>,
}

pub struct Scout {
    provider: Option<Arc<dyn LlmProvider>>,
    fast_path: Option<FastPath>,
    temperature: f32,
    max_tokens: u32,
}

impl Scout {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self {
            provider,
            fast_path: Some(FastPath::new()),
            temperature: 0.1,
            max_tokens: 200,
        }
    }

    pub fn with_fast_path(mut self, enabled: bool) -> Self {
        self.fast_path = enabled.then(FastPath::new);
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn provider(&self) -> Option<&Arc<dyn LlmProvider>> {
        self.provider.as_ref()
    }

    pub async fn classify(
        &self,
        request: &LineRequest,
        cancel: Option<CancellationToken>,
    ) -> Classification {
        if let Some(signal) = self.fast_path.as_ref().and_then(|fp| fp.classify(&request.line)) {
            debug!("scout fast path: {}", signal.signal_type);
            return Classification { signal, called_model: false, error: None };
        }

        let Some(provider) = &self.provider else {
            return Classification {
                signal: heuristic(&request.line),
                called_model: false,
                error: Some("scout: no model configured".into()),
            };
        };

        let prompt = GenerateRequest::new(build_prompt(&request.line))
            .system(SCOUT_SYSTEM_PROMPT)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .json();

        match provider.generate(prompt, cancel).await {
            Ok(completion) => match parse_signal(&completion.text) {
                Some(signal) => Classification { signal, called_model: true, error: None },
                None => {
                    warn!("scout reply unparseable: {}", completion.text);
                    Classification {
                        signal: heuristic(&request.line),
                        called_model: true,
                        error: Some("scout: unparseable reply".into()),
                    }
                }
            },
            Err(e) => {
                warn!("scout bridge failed: {}", e);
                Classification {
                    signal: heuristic(&request.line),
                    called_model: true,
                    error: Some(format!("scout: {}", e)),
                }
            }
        }
    }
}

fn build_prompt(line: &str) -> String {
    let categories = SignalType::ALL
        .iter()
        .map(|t| format!("- {}: {}", t, t.description()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Classify this overlong Python line.\n\nCategories:\n{}\n\nLine:\n{}\n\n\
         Respond as {{\"signal_type\": \"<category>\", \"confidence\": <0..1>, \"reasoning\": \"<short>\"}}",
        categories, line
    )
}

/// Parse the scout model's JSON answer.
pub fn parse_signal(text: &str) -> Option<ScoutSignal> {
    let value = extract_json_object(text)?;
    let signal_type: SignalType = value
        .get("signal_type")
        .or_else(|| value.get("type"))
        .and_then(|v| v.as_str())?
        .parse()
        .ok()?;
    let confidence = value
        .get("confidence")
        .and_then(|v| v.as_f64())
        .map(|c| c as f32)
        .unwrap_or(DEFAULT_MODEL_CONFIDENCE);
    let reasoning = value
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    Some(ScoutSignal::new(signal_type, confidence, reasoning))
}

/// Keyword guess used when the model can't answer.
pub fn heuristic(line: &str) -> ScoutSignal {
    let trimmed = line.trim_start();
    let signal_type = if trimmed.starts_with('#') {
        SignalType::Comment
    } else if line.contains('(') {
        SignalType::FunctionCall
    } else if line.contains('[') || line.contains('{') {
        SignalType::Collection
    } else {
        SignalType::Expression
    };
    ScoutSignal::new(signal_type, HEURISTIC_CONFIDENCE, "heuristic")
}
