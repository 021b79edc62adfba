//! Triangular coordinator: scout, worker, oracle, then fallback
//!
//! States: CLASSIFY -> GENERATE -> VALIDATE -> (RETRY -> GENERATE)* -> FALLBACK? -> DONE.
//! The only cycle is bounded by `max_retries` worker calls. Bridge failures are
//! recorded as strings on the result and send the request to the fallback.

use crate::bridges;
use crate::fallback::split_line;
use crate::oracle::Oracle;
use crate::scout::Scout;
use crate::worker::{Worker, WorkerTask};
use aios_core::{
    char_len, fits, AgentTier, AiosConfig, CoordinationResult, CoordinatorState, LineRequest,
    OracleDecision, Resolution, Route, ScoutSignal,
};
use aios_llm::{CancellationToken, LlmProvider};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Confidence for a locally validated candidate the oracle never saw.
const UNREVIEWED_CONFIDENCE: f32 = 0.6;
/// Confidence when the oracle approves without stating one.
const APPROVED_CONFIDENCE: f32 = 0.8;

#[derive(Clone, Debug)]
pub struct CoordinatorSettings {
    pub max_length: usize,
    pub break_column: usize,
    pub max_retries: usize,
    pub min_scout_confidence: f32,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self { max_length: 79, break_column: 76, max_retries: 2, min_scout_confidence: 0.5 }
    }
}

impl CoordinatorSettings {
    pub fn from_config(config: &AiosConfig) -> Self {
        Self {
            max_length: config.line.max_length,
            break_column: config.line.break_column,
            max_retries: config.coordinator.max_retries,
            min_scout_confidence: config.coordinator.min_scout_confidence,
        }
    }
}

/// One tier as reported by `/tools` and `aios health`.
#[derive(Clone, Debug, Serialize)]
pub struct TierInfo {
    pub tier: AgentTier,
    pub persona: &'static str,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub configured: bool,
}

/// Why the request ended up in the fallback splitter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FallbackReason {
    Routed,
    NoWorker,
    BridgeFailure,
    Rejected,
    Exhausted,
}

pub struct Coordinator {
    scout: Scout,
    worker: Option<Worker>,
    oracle: Option<Oracle>,
    settings: CoordinatorSettings,
}

impl Coordinator {
    pub fn new(
        scout: Scout,
        worker: Option<Worker>,
        oracle: Option<Oracle>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self { scout, worker, oracle, settings }
    }

    /// Wire Ollama scout/worker and the Gemini oracle from configuration.
    pub fn from_config(config: &AiosConfig) -> Self {
        let scout = Scout::new(Some(bridges::local_provider(&config.scout)))
            .with_fast_path(config.coordinator.fast_path)
            .with_sampling(config.scout.temperature, config.scout.max_tokens);
        let worker = Worker::new(bridges::local_provider(&config.worker))
            .with_sampling(config.worker.temperature, config.worker.max_tokens);
        let oracle = bridges::oracle_provider(&config.oracle).map(|p| {
            Oracle::new(p).with_sampling(config.oracle.temperature, config.oracle.max_tokens)
        });
        if oracle.is_none() {
            warn!(
                "oracle disabled: ${} not set; candidates are accepted on local checks only",
                config.oracle.api_key_env
            );
        }
        Self::new(scout, Some(worker), oracle, CoordinatorSettings::from_config(config))
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn tiers(&self) -> Vec<TierInfo> {
        let describe = |tier: AgentTier, provider: Option<&Arc<dyn LlmProvider>>| {
            TierInfo {
                tier,
                persona: tier.persona(),
                provider: provider.map(|p| p.name().to_string()),
                model: provider.map(|p| p.model().to_string()),
                configured: provider.is_some(),
            }
        };
        vec![
            describe(AgentTier::Scout, self.scout.provider()),
            describe(AgentTier::Worker, self.worker.as_ref().map(|w| w.provider())),
            describe(AgentTier::Oracle, self.oracle.as_ref().map(|o| o.provider())),
            TierInfo {
                tier: AgentTier::Fallback,
                persona: AgentTier::Fallback.persona(),
                provider: None,
                model: None,
                configured: true,
            },
        ]
    }

    pub async fn coordinate(&self, request: LineRequest) -> CoordinationResult {
        self.coordinate_with_cancel(request, None).await
    }

    pub async fn coordinate_with_cancel(
        &self,
        request: LineRequest,
        cancel: Option<CancellationToken>,
    ) -> CoordinationResult {
        let started = Instant::now();
        let max_length = self.settings.max_length;
        let mut result = CoordinationResult::new(request.line.trim_end());

        if char_len(request.line.trim_end()) <= max_length {
            result.trace.push(CoordinatorState::Done);
            result.success = true;
            result.confidence = 1.0;
            return result;
        }

        info!(
            request = %result.request_id,
            "coordinating {} char line{}",
            char_len(&request.line),
            request
                .file
                .as_ref()
                .map(|f| format!(" from {}:{}", f, request.line_number.unwrap_or(0)))
                .unwrap_or_default()
        );

        let mut state = CoordinatorState::Classify;
        let mut signal: Option<ScoutSignal> = None;
        let mut candidate: Option<String> = None;
        let mut feedback: Option<String> = None;
        let mut reason = FallbackReason::Exhausted;

        loop {
            result.trace.push(state);
            debug!(request = %result.request_id, "state {:?}", state);

            state = match state {
                CoordinatorState::Classify => {
                    result.visit(AgentTier::Scout);
                    let classification = self.scout.classify(&request, cancel.clone()).await;
                    let model_answered = classification.called_model && classification.error.is_none();
                    if let Some(e) = classification.error {
                        result.errors.push(e);
                    }
                    let mut s = classification.signal;
                    let floor = self.settings.min_scout_confidence;
                    if model_answered && s.confidence < floor {
                        debug!(
                            request = %result.request_id,
                            "scout label {} at {:.2} is below {:.2}",
                            s.signal_type, s.confidence, floor
                        );
                        result.errors.push(format!(
                            "scout: {} at confidence {:.2} is below {:.2}, using heuristic",
                            s.signal_type, s.confidence, floor
                        ));
                        s = crate::scout::heuristic(&request.line);
                    }
                    let route = s.route;
                    signal = Some(s);

                    match route {
                        Route::Fallback => {
                            reason = FallbackReason::Routed;
                            CoordinatorState::Fallback
                        }
                        _ if self.worker.is_none() || self.settings.max_retries == 0 => {
                            reason = FallbackReason::NoWorker;
                            CoordinatorState::Fallback
                        }
                        _ => CoordinatorState::Generate,
                    }
                }

                CoordinatorState::Generate => match &self.worker {
                    None => {
                        reason = FallbackReason::NoWorker;
                        CoordinatorState::Fallback
                    }
                    Some(worker) => {
                        result.visit(AgentTier::Worker);
                        result.worker_attempts += 1;

                        let current_signal = signal
                            .clone()
                            .unwrap_or_else(|| crate::scout::heuristic(&request.line));
                        let revision = match (&candidate, &feedback) {
                            (Some(prev), Some(fb)) => Some((prev.as_str(), fb.as_str())),
                            _ => None,
                        };
                        let task = WorkerTask {
                            request: &request,
                            signal: &current_signal,
                            max_length,
                            revision,
                        };
                        let generated = worker.generate(&task, cancel.clone()).await;
                        match generated {
                            Ok(text) => {
                                candidate = Some(text);
                                CoordinatorState::Validate
                            }
                            Err(e) => {
                                warn!(request = %result.request_id, "worker failed: {}", e);
                                result.errors.push(format!("worker: {}", e));
                                reason = FallbackReason::BridgeFailure;
                                CoordinatorState::Fallback
                            }
                        }
                    }
                },

                CoordinatorState::Validate => {
                    let cand = candidate.clone().unwrap_or_default();
                    let budget_left = result.worker_attempts < self.settings.max_retries;

                    if let Err(problem) = local_check(&result.original, &cand, max_length) {
                        debug!(request = %result.request_id, "local check: {}", problem);
                        feedback = Some(problem);
                        if budget_left {
                            CoordinatorState::Retry
                        } else {
                            reason = FallbackReason::Exhausted;
                            CoordinatorState::Fallback
                        }
                    } else if let Some(oracle) = &self.oracle {
                        result.visit(AgentTier::Oracle);
                        let current_signal = signal
                            .clone()
                            .unwrap_or_else(|| crate::scout::heuristic(&request.line));
                        let reviewed = oracle
                            .validate(&result.original, &cand, &current_signal, max_length, cancel.clone())
                            .await;
                        match reviewed {
                            Ok(verdict) => {
                                let decision = verdict.decision;
                                let confidence = verdict.confidence;
                                let verdict_feedback = verdict.feedback.clone();
                                result.oracle = Some(verdict);
                                match decision {
                                    OracleDecision::Approve => {
                                        result.fixed = cand;
                                        result.resolution = Resolution::Agent;
                                        result.confidence = if confidence > 0.0 {
                                            confidence
                                        } else {
                                            APPROVED_CONFIDENCE
                                        };
                                        CoordinatorState::Done
                                    }
                                    OracleDecision::Revise if budget_left => {
                                        feedback = Some(verdict_feedback);
                                        CoordinatorState::Retry
                                    }
                                    OracleDecision::Revise => {
                                        reason = FallbackReason::Exhausted;
                                        CoordinatorState::Fallback
                                    }
                                    OracleDecision::Reject => {
                                        reason = FallbackReason::Rejected;
                                        CoordinatorState::Fallback
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(request = %result.request_id, "oracle failed: {}", e);
                                result.errors.push(format!("oracle: {}", e));
                                reason = FallbackReason::BridgeFailure;
                                CoordinatorState::Fallback
                            }
                        }
                    } else {
                        result.errors.push("oracle unavailable: accepted on local checks".into());
                        result.fixed = cand;
                        result.resolution = Resolution::Agent;
                        result.confidence = UNREVIEWED_CONFIDENCE;
                        CoordinatorState::Done
                    }
                }

                CoordinatorState::Retry => {
                    debug!(
                        request = %result.request_id,
                        "retrying worker ({}/{})",
                        result.worker_attempts + 1,
                        self.settings.max_retries
                    );
                    CoordinatorState::Generate
                }

                CoordinatorState::Fallback => {
                    result.visit(AgentTier::Fallback);
                    let split = split_line(
                        &result.original,
                        max_length,
                        self.settings.break_column,
                    );
                    result.fixed = split.text();
                    result.resolution = Resolution::Fallback;
                    result.low_confidence = reason != FallbackReason::Routed || !split.complete;
                    result.confidence = match (split.complete, reason) {
                        (false, _) => 0.1,
                        (true, FallbackReason::Routed) => 0.9,
                        (true, _) => 0.4,
                    };
                    if !split.complete {
                        result.errors.push("fallback: no safe break point".into());
                    }
                    CoordinatorState::Done
                }

                CoordinatorState::Done => break,
            };
        }

        result.signal = signal;
        result.success = fits(&result.fixed, max_length);
        result.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            request = %result.request_id,
            "done: {:?} success={} attempts={} confidence={:.2}",
            result.resolution,
            result.success,
            result.worker_attempts,
            result.confidence
        );
        result
    }
}

/// Checks that need no model: non-empty, changed, and within the limit.
pub fn local_check(original: &str, candidate: &str, max_length: usize) -> Result<(), String> {
    if candidate.trim().is_empty() {
        return Err("the reply was empty".into());
    }
    if candidate.trim() == original.trim() {
        return Err("the line was returned unchanged".into());
    }
    for (i, line) in candidate.lines().enumerate() {
        let len = char_len(line);
        if len > max_length {
            return Err(format!(
                "line {} is still {} characters (limit {})",
                i + 1,
                len,
                max_length
            ));
        }
    }
    Ok(())
}
