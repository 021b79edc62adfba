//! Core types for the triangular coordination pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification label the scout assigns to an overlong line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    #[serde(rename = "E501_STRING")]
    String,
    #[serde(rename = "E501_FSTRING")]
    FString,
    #[serde(rename = "E501_COMMENT")]
    Comment,
    #[serde(rename = "E501_DOCSTRING")]
    Docstring,
    #[serde(rename = "E501_IMPORT")]
    Import,
    #[serde(rename = "E501_FUNCTION_DEF")]
    FunctionDef,
    #[serde(rename = "E501_FUNCTION_CALL")]
    FunctionCall,
    #[serde(rename = "E501_COLLECTION")]
    Collection,
    #[serde(rename = "E501_EXPRESSION")]
    Expression,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl SignalType {
    pub const ALL: [SignalType; 10] = [
        SignalType::String,
        SignalType::FString,
        SignalType::Comment,
        SignalType::Docstring,
        SignalType::Import,
        SignalType::FunctionDef,
        SignalType::FunctionCall,
        SignalType::Collection,
        SignalType::Expression,
        SignalType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::String => "E501_STRING",
            SignalType::FString => "E501_FSTRING",
            SignalType::Comment => "E501_COMMENT",
            SignalType::Docstring => "E501_DOCSTRING",
            SignalType::Import => "E501_IMPORT",
            SignalType::FunctionDef => "E501_FUNCTION_DEF",
            SignalType::FunctionCall => "E501_FUNCTION_CALL",
            SignalType::Collection => "E501_COLLECTION",
            SignalType::Expression => "E501_EXPRESSION",
            SignalType::Unknown => "UNKNOWN",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            SignalType::String => "Assignment of a long plain string literal",
            SignalType::FString => "Assignment of a long f-string",
            SignalType::Comment => "Full-line comment",
            SignalType::Docstring => "Line inside a docstring",
            SignalType::Import => "Import statement with many names",
            SignalType::FunctionDef => "Function signature with many parameters",
            SignalType::FunctionCall => "Call with long argument list",
            SignalType::Collection => "List, dict, set or tuple literal",
            SignalType::Expression => "Long arithmetic or boolean expression",
            SignalType::Unknown => "Unclassified overlong line",
        }
    }

    /// Which tier handles this kind of line after classification.
    pub fn default_route(&self) -> Route {
        match self {
            SignalType::Comment => Route::Fallback,
            _ => Route::Worker,
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = String;

    /// Case-insensitive; the `E501_` prefix is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        let bare = upper.strip_prefix("E501_").unwrap_or(&upper);
        SignalType::ALL
            .iter()
            .copied()
            .find(|t| {
                let name = t.as_str();
                name == upper || name.strip_prefix("E501_").unwrap_or(name) == bare
            })
            .ok_or_else(|| format!("unknown signal type: {}", s))
    }
}

/// Routing decision produced by the scout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Worker,
    Fallback,
}

/// Scout output: classification plus routing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoutSignal {
    pub signal_type: SignalType,
    pub route: Route,
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub fast_path: bool,
}

impl ScoutSignal {
    pub fn new(signal_type: SignalType, confidence: f32, reasoning: impl Into<String>) -> Self {
        Self {
            signal_type,
            route: signal_type.default_route(),
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            fast_path: false,
        }
    }

    pub fn fast(signal_type: SignalType, reasoning: impl Into<String>) -> Self {
        Self {
            fast_path: true,
            ..Self::new(signal_type, 0.95, reasoning)
        }
    }
}

/// The three agent roles plus the deterministic fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentTier {
    Scout,
    Worker,
    Oracle,
    Fallback,
}

impl AgentTier {
    /// The bridge persona conventionally backing this tier.
    pub fn persona(&self) -> &'static str {
        match self {
            AgentTier::Scout => "gemma",
            AgentTier::Worker => "mistral",
            AgentTier::Oracle => "gemini",
            AgentTier::Fallback => "splitter",
        }
    }
}

impl fmt::Display for AgentTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentTier::Scout => "scout",
            AgentTier::Worker => "worker",
            AgentTier::Oracle => "oracle",
            AgentTier::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OracleDecision {
    Approve,
    Reject,
    Revise,
}

impl FromStr for OracleDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "APPROVE" | "APPROVED" => Ok(Self::Approve),
            "REJECT" | "REJECTED" => Ok(Self::Reject),
            "REVISE" | "REVISION" => Ok(Self::Revise),
            other => Err(format!("unknown oracle decision: {}", other)),
        }
    }
}

/// Oracle verdict, the fixed JSON schema the oracle must answer with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OracleVerdict {
    pub decision: OracleDecision,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default = "default_true")]
    pub semantic_preserved: bool,
}

fn default_true() -> bool {
    true
}

/// How a coordination request was resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Unchanged,
    Agent,
    Fallback,
}

/// Coordinator state machine states.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CoordinatorState {
    Classify,
    Generate,
    Validate,
    Retry,
    Fallback,
    Done,
}

/// Input to the coordinator.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LineRequest {
    pub line: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<usize>,
}

impl LineRequest {
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            file: None,
            line_number: None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line_number: usize) -> Self {
        self.file = Some(file.into());
        self.line_number = Some(line_number);
        self
    }
}

/// Single-request result record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoordinationResult {
    pub request_id: uuid::Uuid,
    pub success: bool,
    pub original: String,
    pub fixed: String,
    pub resolution: Resolution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<ScoutSignal>,
    pub agents_visited: Vec<AgentTier>,
    pub worker_attempts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle: Option<OracleVerdict>,
    pub confidence: f32,
    pub low_confidence: bool,
    pub errors: Vec<String>,
    pub trace: Vec<CoordinatorState>,
    pub duration_ms: u64,
}

impl CoordinationResult {
    pub fn new(original: impl Into<String>) -> Self {
        let original = original.into();
        Self {
            request_id: uuid::Uuid::new_v4(),
            success: false,
            fixed: original.clone(),
            original,
            resolution: Resolution::Unchanged,
            signal: None,
            agents_visited: Vec::new(),
            worker_attempts: 0,
            oracle: None,
            confidence: 0.0,
            low_confidence: false,
            errors: Vec::new(),
            trace: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Record a tier visit once, keeping first-visit order.
    pub fn visit(&mut self, tier: AgentTier) {
        if !self.agents_visited.contains(&tier) {
            self.agents_visited.push(tier);
        }
    }

    pub fn fixed_lines(&self) -> impl Iterator<Item = &str> {
        self.fixed.lines()
    }

    pub fn changed(&self) -> bool {
        self.fixed != self.original
    }
}

/// Length in characters, which is what line-length limits count.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Whether every line of `text` fits within `max_length`.
pub fn fits(text: &str, max_length: usize) -> bool {
    text.lines().all(|l| char_len(l) <= max_length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_type_serializes_screaming() {
        let json = serde_json::to_string(&SignalType::String).unwrap();
        assert_eq!(json, r#""E501_STRING""#);
        let back: SignalType = serde_json::from_str(r#""E501_FUNCTION_CALL""#).unwrap();
        assert_eq!(back, SignalType::FunctionCall);
    }

    #[test]
    fn signal_type_parse_is_lenient() {
        assert_eq!("e501_string".parse::<SignalType>().unwrap(), SignalType::String);
        assert_eq!("FUNCTION_CALL".parse::<SignalType>().unwrap(), SignalType::FunctionCall);
        assert_eq!("function-def".parse::<SignalType>().unwrap(), SignalType::FunctionDef);
        assert_eq!("unknown".parse::<SignalType>().unwrap(), SignalType::Unknown);
        assert!("E999".parse::<SignalType>().is_err());
    }

    #[test]
    fn comments_route_to_fallback() {
        assert_eq!(SignalType::Comment.default_route(), Route::Fallback);
        assert_eq!(SignalType::String.default_route(), Route::Worker);
    }

    #[test]
    fn scout_signal_clamps_confidence() {
        let s = ScoutSignal::new(SignalType::Import, 1.7, "");
        assert_eq!(s.confidence, 1.0);
        let s = ScoutSignal::new(SignalType::Import, -0.2, "");
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn oracle_verdict_defaults() {
        let v: OracleVerdict = serde_json::from_str(r#"{"decision":"APPROVE"}"#).unwrap();
        assert_eq!(v.decision, OracleDecision::Approve);
        assert!(v.semantic_preserved);
        assert!(v.issues.is_empty());
    }

    #[test]
    fn visit_dedupes() {
        let mut r = CoordinationResult::new("x");
        r.visit(AgentTier::Worker);
        r.visit(AgentTier::Oracle);
        r.visit(AgentTier::Worker);
        assert_eq!(r.agents_visited, vec![AgentTier::Worker, AgentTier::Oracle]);
    }

    #[test]
    fn fits_counts_chars_per_line() {
        assert!(fits("abc\ndef", 3));
        assert!(!fits("abcd\nde", 3));
        assert!(fits("ééé", 3));
    }
}
