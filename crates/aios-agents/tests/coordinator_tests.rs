//! Coordinator state machine tests against scripted bridges

use aios_agents::{Coordinator, CoordinatorSettings, Oracle, Scout, Worker};
use aios_core::{
    fits, AgentTier, CoordinatorState, LineRequest, OracleDecision, Resolution, SignalType,
};
use aios_llm::{CancellationToken, MockBehavior, MockProvider};
use std::sync::Arc;

const LONG_CALL: &str =
    "    response = client.submit_request(payload_builder(first_value, second_value), retries=3)";
const FIXED_CALL: &str = "    response = client.submit_request(\n        payload_builder(first_value, second_value), retries=3)";

fn approve(confidence: f32) -> MockBehavior {
    MockBehavior::text(format!(
        r#"{{"decision": "APPROVE", "confidence": {}, "feedback": "", "issues": [], "semantic_preserved": true}}"#,
        confidence
    ))
}

fn revise(feedback: &str) -> MockBehavior {
    MockBehavior::text(format!(
        r#"{{"decision": "REVISE", "confidence": 0.5, "feedback": "{}", "issues": [], "semantic_preserved": true}}"#,
        feedback
    ))
}

fn reject() -> MockBehavior {
    MockBehavior::text(r#"{"decision": "REJECT", "confidence": 0.9, "feedback": "changes behavior"}"#)
}

fn scout_reply(signal: &str) -> MockBehavior {
    scout_reply_at(signal, 0.8)
}

fn scout_reply_at(signal: &str, confidence: f32) -> MockBehavior {
    MockBehavior::text(format!(
        r#"{{"signal_type": "{}", "confidence": {}, "reasoning": "call"}}"#,
        signal, confidence
    ))
}

struct Harness {
    scout: Arc<MockProvider>,
    worker: Arc<MockProvider>,
    oracle: Arc<MockProvider>,
}

impl Harness {
    fn new(scout: Vec<MockBehavior>, worker: Vec<MockBehavior>, oracle: Vec<MockBehavior>) -> Self {
        Self {
            scout: Arc::new(MockProvider::sequence(scout).named("mock-scout", "gemma3:1b")),
            worker: Arc::new(MockProvider::sequence(worker).named("mock-worker", "mistral:7b")),
            oracle: Arc::new(MockProvider::sequence(oracle).named("mock-oracle", "gemini-2.5-flash")),
        }
    }

    fn coordinator(&self, max_retries: usize) -> Coordinator {
        Coordinator::new(
            Scout::new(Some(self.scout.clone())),
            Some(Worker::new(self.worker.clone())),
            Some(Oracle::new(self.oracle.clone())),
            CoordinatorSettings { max_retries, ..CoordinatorSettings::default() },
        )
    }
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn approved_candidate_resolves_by_agent() {
    let h = Harness::new(
        vec![scout_reply("E501_FUNCTION_CALL")],
        vec![MockBehavior::text(FIXED_CALL)],
        vec![approve(0.92)],
    );
    let result = h.coordinator(2).coordinate(LineRequest::new(LONG_CALL).at("app.py", 10)).await;

    assert!(result.success);
    assert_eq!(result.resolution, Resolution::Agent);
    assert_eq!(result.fixed, FIXED_CALL);
    assert_eq!(result.worker_attempts, 1);
    assert!((result.confidence - 0.92).abs() < 1e-6);
    assert!(!result.low_confidence);
    assert_eq!(
        result.agents_visited,
        vec![AgentTier::Scout, AgentTier::Worker, AgentTier::Oracle]
    );
    assert_eq!(
        result.trace,
        vec![
            CoordinatorState::Classify,
            CoordinatorState::Generate,
            CoordinatorState::Validate,
            CoordinatorState::Done,
        ]
    );
    assert_eq!(result.signal.map(|s| s.signal_type), Some(SignalType::FunctionCall));
    assert_eq!(result.oracle.map(|v| v.decision), Some(OracleDecision::Approve));
}

#[tokio::test]
async fn approve_without_confidence_uses_default() {
    let h = Harness::new(
        vec![scout_reply("E501_FUNCTION_CALL")],
        vec![MockBehavior::text(FIXED_CALL)],
        vec![MockBehavior::text(r#"{"decision": "APPROVE"}"#)],
    );
    let result = h.coordinator(2).coordinate(LineRequest::new(LONG_CALL)).await;
    assert_eq!(result.resolution, Resolution::Agent);
    assert!((result.confidence - 0.8).abs() < 1e-6);
}

#[tokio::test]
async fn short_line_skips_every_tier() {
    let h = Harness::new(vec![], vec![], vec![]);
    let result = h.coordinator(2).coordinate(LineRequest::new("x = 1")).await;
    assert!(result.success);
    assert_eq!(result.resolution, Resolution::Unchanged);
    assert_eq!(h.scout.call_count() + h.worker.call_count() + h.oracle.call_count(), 0);
}

// ============================================================================
// Retry budget
// ============================================================================

#[tokio::test]
async fn revise_retries_with_feedback_then_approves() {
    let h = Harness::new(
        vec![scout_reply("E501_FUNCTION_CALL")],
        vec![MockBehavior::text(FIXED_CALL), MockBehavior::text(FIXED_CALL)],
        vec![revise("align the arguments"), approve(0.85)],
    );
    let result = h.coordinator(2).coordinate(LineRequest::new(LONG_CALL)).await;

    assert_eq!(result.resolution, Resolution::Agent);
    assert_eq!(result.worker_attempts, 2);
    assert!(result.trace.contains(&CoordinatorState::Retry));

    let second = &h.worker.requests()[1];
    assert!(second.prompt.contains("Feedback: align the arguments"));
}

#[tokio::test]
async fn worker_calls_never_exceed_max_retries() {
    for max_retries in 1..=4 {
        let oracle = vec![revise("again"); 10];
        let worker = vec![MockBehavior::text(FIXED_CALL); 10];
        let h = Harness::new(vec![scout_reply("E501_FUNCTION_CALL")], worker, oracle);
        let result = h.coordinator(max_retries).coordinate(LineRequest::new(LONG_CALL)).await;

        assert_eq!(h.worker.call_count(), max_retries);
        assert_eq!(result.worker_attempts, max_retries);
        assert_eq!(result.resolution, Resolution::Fallback);
        assert!(result.low_confidence);
        assert_eq!(result.trace.last(), Some(&CoordinatorState::Done));
    }
}

#[tokio::test]
async fn zero_retries_goes_straight_to_fallback() {
    let h = Harness::new(vec![scout_reply("E501_FUNCTION_CALL")], vec![], vec![]);
    let result = h.coordinator(0).coordinate(LineRequest::new(LONG_CALL)).await;
    assert_eq!(h.worker.call_count(), 0);
    assert_eq!(result.resolution, Resolution::Fallback);
    assert!(result.success);
    assert!(fits(&result.fixed, 79));
}

#[tokio::test]
async fn locally_invalid_candidate_skips_oracle() {
    let still_long = format!("    {}", "y".repeat(90));
    let h = Harness::new(
        vec![scout_reply("E501_EXPRESSION")],
        vec![MockBehavior::text(still_long), MockBehavior::text(FIXED_CALL)],
        vec![approve(0.9)],
    );
    let result = h.coordinator(2).coordinate(LineRequest::new(LONG_CALL)).await;

    assert_eq!(result.resolution, Resolution::Agent);
    assert_eq!(h.oracle.call_count(), 1);
    let second = &h.worker.requests()[1];
    assert!(second.prompt.contains("still 94 characters"));
}

#[tokio::test]
async fn empty_worker_reply_is_retried() {
    let h = Harness::new(
        vec![scout_reply("E501_FUNCTION_CALL")],
        vec![MockBehavior::text("```python\n```"), MockBehavior::text(FIXED_CALL)],
        vec![approve(0.9)],
    );
    let result = h.coordinator(2).coordinate(LineRequest::new(LONG_CALL)).await;

    assert_eq!(result.resolution, Resolution::Agent);
    assert_eq!(result.fixed, FIXED_CALL);
    assert_eq!(result.worker_attempts, 2);
    assert!(result.trace.contains(&CoordinatorState::Retry));
    assert_eq!(h.oracle.call_count(), 1);
    assert!(!result.errors.iter().any(|e| e.starts_with("worker:")));
    let second = &h.worker.requests()[1];
    assert!(second.prompt.contains("the reply was empty"));
}

// ============================================================================
// Fallback paths
// ============================================================================

#[tokio::test]
async fn reject_falls_back_low_confidence() {
    let h = Harness::new(
        vec![scout_reply("E501_FUNCTION_CALL")],
        vec![MockBehavior::text(FIXED_CALL)],
        vec![reject()],
    );
    let result = h.coordinator(2).coordinate(LineRequest::new(LONG_CALL)).await;

    assert_eq!(h.worker.call_count(), 1);
    assert_eq!(result.resolution, Resolution::Fallback);
    assert!(result.low_confidence);
    assert!(result.success);
    assert!(result.agents_visited.contains(&AgentTier::Fallback));
    assert_eq!(result.oracle.map(|v| v.decision), Some(OracleDecision::Reject));
}

#[tokio::test]
async fn worker_bridge_error_is_recorded_and_falls_back() {
    let h = Harness::new(
        vec![scout_reply("E501_FUNCTION_CALL")],
        vec![MockBehavior::Error("connection refused".into())],
        vec![],
    );
    let result = h.coordinator(2).coordinate(LineRequest::new(LONG_CALL)).await;

    assert_eq!(result.resolution, Resolution::Fallback);
    assert_eq!(h.oracle.call_count(), 0);
    assert!(result.errors.iter().any(|e| e.starts_with("worker:")));
    assert!(result.errors.iter().any(|e| e.contains("connection refused")));
}

#[tokio::test]
async fn oracle_error_falls_back() {
    let h = Harness::new(
        vec![scout_reply("E501_FUNCTION_CALL")],
        vec![MockBehavior::text(FIXED_CALL)],
        vec![MockBehavior::Timeout],
    );
    let result = h.coordinator(2).coordinate(LineRequest::new(LONG_CALL)).await;
    assert_eq!(result.resolution, Resolution::Fallback);
    assert!(result.errors.iter().any(|e| e.starts_with("oracle:")));
}

#[tokio::test]
async fn unparseable_oracle_reply_falls_back() {
    let h = Harness::new(
        vec![scout_reply("E501_FUNCTION_CALL")],
        vec![MockBehavior::text(FIXED_CALL)],
        vec![MockBehavior::text("looks fine to me")],
    );
    let result = h.coordinator(2).coordinate(LineRequest::new(LONG_CALL)).await;
    assert_eq!(result.resolution, Resolution::Fallback);
    assert!(result.oracle.is_none());
}

#[tokio::test]
async fn long_line_without_break_terminates() {
    let line = format!("x = {}", "a".repeat(116));
    assert_eq!(line.chars().count(), 120);

    let c = Coordinator::new(Scout::new(None), None, None, CoordinatorSettings::default());
    let result = c.coordinate(LineRequest::new(line.clone())).await;

    assert_eq!(result.resolution, Resolution::Fallback);
    assert!(!result.success);
    assert!(result.low_confidence);
    assert_eq!(result.fixed, line);
    assert!(result.errors.iter().any(|e| e.contains("no safe break")));
    assert_eq!(result.trace.last(), Some(&CoordinatorState::Done));
}

#[tokio::test]
async fn comments_route_to_fallback_without_worker() {
    let comment = format!("    # {}", "word ".repeat(20).trim_end());
    let h = Harness::new(vec![], vec![], vec![]);
    let result = h.coordinator(2).coordinate(LineRequest::new(comment)).await;

    assert_eq!(h.scout.call_count(), 0);
    assert_eq!(h.worker.call_count(), 0);
    assert_eq!(result.resolution, Resolution::Fallback);
    assert!(!result.low_confidence);
    assert!(result.success);
    assert!(result.fixed_lines().all(|l| l.trim_start().starts_with('#')));
}

#[tokio::test]
async fn pragma_comment_is_not_rewrapped() {
    let pragma = format!("    # type: ignore[{}]", "attr-defined, ".repeat(6).trim_end_matches(&[',', ' '][..]));
    assert!(pragma.chars().count() > 79);
    let h = Harness::new(vec![], vec![], vec![]);
    let result = h.coordinator(2).coordinate(LineRequest::new(pragma.clone())).await;

    assert_eq!(h.worker.call_count(), 0);
    assert_eq!(result.resolution, Resolution::Fallback);
    assert!(!result.success);
    assert!(result.low_confidence);
    assert_eq!(result.fixed, pragma);
}

// ============================================================================
// Scout behavior inside the pipeline
// ============================================================================

#[tokio::test]
async fn string_assignment_fast_path_skips_scout_call() {
    let line = format!("message = \"{}\"", "x".repeat(78));
    assert_eq!(line.chars().count(), 90);
    let fixed = format!("message = (\n    \"{}\"\n    \"{}\")", "x".repeat(39), "x".repeat(39));
    let h = Harness::new(vec![], vec![MockBehavior::text(fixed)], vec![approve(0.9)]);
    let result = h.coordinator(2).coordinate(LineRequest::new(line)).await;

    assert_eq!(h.scout.call_count(), 0);
    assert_eq!(h.worker.call_count(), 1);
    let signal = result.signal.unwrap();
    assert_eq!(signal.signal_type, SignalType::String);
    assert!(signal.fast_path);
    assert_eq!(result.resolution, Resolution::Agent);
}

#[tokio::test]
async fn scout_failure_degrades_to_heuristic() {
    let h = Harness::new(
        vec![MockBehavior::Error("scout down".into())],
        vec![MockBehavior::text(FIXED_CALL)],
        vec![approve(0.9)],
    );
    let result = h.coordinator(2).coordinate(LineRequest::new(LONG_CALL)).await;

    assert_eq!(result.resolution, Resolution::Agent);
    assert_eq!(result.signal.map(|s| s.signal_type), Some(SignalType::FunctionCall));
    assert!(result.errors.iter().any(|e| e.starts_with("scout:")));
}

#[tokio::test]
async fn uncertain_scout_label_is_replaced_by_heuristic() {
    let h = Harness::new(
        vec![scout_reply_at("E501_COMMENT", 0.2)],
        vec![MockBehavior::text(FIXED_CALL)],
        vec![approve(0.9)],
    );
    let result = h.coordinator(2).coordinate(LineRequest::new(LONG_CALL)).await;

    assert_eq!(h.scout.call_count(), 1);
    assert_eq!(h.worker.call_count(), 1);
    assert_eq!(result.resolution, Resolution::Agent);
    assert_eq!(result.signal.map(|s| s.signal_type), Some(SignalType::FunctionCall));
    assert!(result.errors.iter().any(|e| e.contains("below 0.50")));
}

#[tokio::test]
async fn scout_floor_is_configurable() {
    let h = Harness::new(
        vec![scout_reply_at("E501_COLLECTION", 0.2)],
        vec![MockBehavior::text(FIXED_CALL)],
        vec![approve(0.9)],
    );
    let c = Coordinator::new(
        Scout::new(Some(h.scout.clone())),
        Some(Worker::new(h.worker.clone())),
        Some(Oracle::new(h.oracle.clone())),
        CoordinatorSettings { min_scout_confidence: 0.1, ..CoordinatorSettings::default() },
    );
    let result = c.coordinate(LineRequest::new(LONG_CALL)).await;
    assert_eq!(result.signal.map(|s| s.signal_type), Some(SignalType::Collection));
    assert!(result.errors.is_empty());
}

// ============================================================================
// Degraded configurations
// ============================================================================

#[tokio::test]
async fn no_oracle_accepts_locally_valid_candidate() {
    let worker = Arc::new(MockProvider::constant(MockBehavior::text(FIXED_CALL)));
    let c = Coordinator::new(
        Scout::new(None),
        Some(Worker::new(worker.clone())),
        None,
        CoordinatorSettings::default(),
    );
    let result = c.coordinate(LineRequest::new(LONG_CALL)).await;

    assert_eq!(result.resolution, Resolution::Agent);
    assert!((result.confidence - 0.6).abs() < 1e-6);
    assert!(result.errors.iter().any(|e| e.contains("oracle unavailable")));
    assert_eq!(worker.call_count(), 1);
}

#[tokio::test]
async fn cancelled_request_falls_back() {
    let h = Harness::new(
        vec![scout_reply("E501_FUNCTION_CALL")],
        vec![MockBehavior::text(FIXED_CALL)],
        vec![approve(0.9)],
    );
    let token = CancellationToken::new();
    token.cancel();
    let result = h
        .coordinator(2)
        .coordinate_with_cancel(LineRequest::new(LONG_CALL), Some(token))
        .await;

    assert_eq!(result.resolution, Resolution::Fallback);
    assert!(result.errors.iter().any(|e| e.starts_with("worker:")));
}

#[tokio::test]
async fn tiers_describe_providers() {
    let h = Harness::new(vec![], vec![], vec![]);
    let tiers = h.coordinator(2).tiers();
    assert_eq!(tiers[0].model.as_deref(), Some("gemma3:1b"));
    assert_eq!(tiers[1].provider.as_deref(), Some("mock-worker"));
    assert_eq!(tiers[2].model.as_deref(), Some("gemini-2.5-flash"));
    assert!(tiers.iter().all(|t| t.configured));
}
