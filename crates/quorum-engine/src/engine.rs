//! The five-step loop: received → analyzing → planning → executing →
//! observing → (replanning → executing)* → synthesizing → done, with a
//! fallback short-circuit from any state. One request, one plan at a time;
//! replanning is bounded and strictly follows the prior execute phase.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use quorum_core::types::{EngineRequest, Turn};
use quorum_progress::{ProgressChannel, ProgressKind};
use quorum_tools::ToolOutcome;

use crate::analyze;
use crate::answer::{ExecutionSummary, SynthesizedAnswer};
use crate::deps::Dependencies;
use crate::error::EngineError;
use crate::execute;
use crate::observe::{self, Decision};
use crate::plan::{StepLog, StepStatus};
use crate::synthesize;

/// The orchestration engine. One instance serves many requests; per-request
/// state (plan, step log, outcomes) lives on the stack of `process` and is
/// never shared across concurrent requests.
pub struct Orchestrator {
    deps: Dependencies,
}

impl Orchestrator {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }

    /// Serve one request, emitting progress throughout.
    ///
    /// Always resolves with an answer unless the request was cancelled —
    /// internal failures degrade to a low-confidence fallback answer with
    /// `requires_human_input` set. The progress channel is closed on exit.
    pub async fn process(
        &self,
        request: EngineRequest,
        progress: Arc<ProgressChannel>,
    ) -> Result<SynthesizedAnswer, EngineError> {
        info!(
            conversation = %request.conversation_id,
            query = %request.user_text.chars().take(80).collect::<String>(),
            "engine request received"
        );

        let result = self.run_pipeline(&request, &progress).await;

        match result {
            Ok(answer) => {
                self.commit(&request, &answer).await;
                progress.close();
                Ok(answer)
            }
            Err(EngineError::Cancelled) => {
                // Terminal acknowledgment, then silence.
                progress.emit(
                    ProgressKind::Warning,
                    "cancelled",
                    "Request cancelled — stopping here.",
                );
                progress.close();
                Err(EngineError::Cancelled)
            }
            Err(EngineError::Internal(reason)) => {
                error!(reason, "engine pipeline failed, producing fallback answer");
                progress.emit(
                    ProgressKind::Error,
                    "internal_error",
                    "Something went wrong on my side — here's what I can offer.",
                );
                let answer = SynthesizedAnswer::fallback(
                    "I'm having trouble analyzing your request right now. Could you try \
                     rephrasing your question or ask me something else?",
                    ExecutionSummary::default(),
                );
                progress.close();
                Ok(answer)
            }
        }
    }

    async fn run_pipeline(
        &self,
        request: &EngineRequest,
        progress: &ProgressChannel,
    ) -> Result<SynthesizedAnswer, EngineError> {
        let deps = &self.deps;
        let budget = Duration::from_millis(deps.config.deadlines.request_budget_ms);
        let started = Instant::now();

        if request.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        // Context construction; every substep inside degrades on its own.
        let history = deps
            .memory
            .hybrid_history(&request.conversation_id, &request.user_text)
            .await;

        // Steps 1–2: analyze and plan (falls back to the keyword heuristic
        // internally; only cancellation propagates).
        let initial_plan = analyze::analyze_and_plan(deps, request, &history, progress).await?;

        let mut steps = StepLog::default();
        for kind in &initial_plan.tools_needed {
            steps.add(
                format!("execute_{}", kind.as_str()),
                format!("Execute {} with planned queries", kind.as_str()),
            );
        }
        steps.add("synthesize_results", "Synthesize all findings into final response");

        // Steps 3–4: execute, observe, and replan up to the hard cap.
        let max_replans = deps.config.deadlines.max_replanning_iterations;
        let mut all_outcomes: Vec<ToolOutcome> = Vec::new();
        let mut replans = 0usize;
        let mut current_plan = initial_plan.clone();

        loop {
            if request.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            progress.emit(
                ProgressKind::Processing,
                "executing_plan",
                "Working through the planned search strategy…",
            );
            for kind in &current_plan.tools_needed {
                steps.update(
                    &format!("execute_{}", kind.as_str()),
                    StepStatus::InProgress,
                    "",
                );
            }

            let outcomes =
                execute::run_execute_phase(deps, request, &current_plan, &mut steps, progress)
                    .await?;
            all_outcomes.extend(outcomes);

            if started.elapsed() >= budget {
                warn!(elapsed = ?started.elapsed(), "request budget exhausted, forcing synthesis");
                progress.emit(
                    ProgressKind::Warning,
                    "budget_exhausted",
                    "This is taking longer than expected — wrapping up with what I have.",
                );
                break;
            }

            match observe::observe_and_decide(deps, request, &all_outcomes, progress).await {
                Decision::Proceed => break,
                Decision::Replan(new_plan) => {
                    if replans >= max_replans {
                        warn!(replans, "replanning cap reached, forcing synthesis");
                        break;
                    }
                    replans += 1;
                    progress.emit(
                        ProgressKind::Replanning,
                        "replan",
                        &format!(
                            "Adjusting my approach — trying {}…",
                            new_plan
                                .tools_needed
                                .iter()
                                .map(|k| k.as_str().replace('_', " "))
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                    );
                    for kind in &new_plan.tools_needed {
                        let action_id = format!("execute_{}", kind.as_str());
                        if !steps.steps().iter().any(|s| s.action_id == action_id) {
                            steps.add(
                                action_id,
                                format!("Execute {} after replanning", kind.as_str()),
                            );
                        }
                    }
                    current_plan = new_plan;
                }
            }
        }

        if request.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        // Step 5: synthesize. Infallible — tier fallback and the template
        // answer live inside.
        steps.update("synthesize_results", StepStatus::InProgress, "");
        let mut answer = synthesize::run_synthesis(
            deps,
            request,
            &current_plan,
            &all_outcomes,
            &steps,
            replans,
            progress,
        )
        .await;

        steps.update(
            "synthesize_results",
            StepStatus::Completed,
            &format!("{} chars", answer.text.len()),
        );
        answer.execution_summary = ExecutionSummary {
            steps_completed: steps.completed_count(),
            total_steps: steps.len(),
            replanning_iterations: replans,
        };

        info!(
            confidence = ?answer.confidence,
            findings = answer.key_findings.len(),
            links = answer.source_links.len(),
            replans,
            elapsed = ?started.elapsed(),
            "engine request complete"
        );
        Ok(answer)
    }

    /// Persist the exchange so future turns see it; failures only log.
    async fn commit(&self, request: &EngineRequest, answer: &SynthesizedAnswer) {
        let mut user_turn = Turn::user(request.conversation_id.clone(), &request.user_text);
        user_turn.author.name = request.user_profile.name.clone();
        let assistant_turn = Turn::assistant(request.conversation_id.clone(), &answer.text);

        if let Err(e) = self
            .deps
            .memory
            .commit_exchange(&request.conversation_id, user_turn, assistant_turn)
            .await
        {
            warn!(conversation = %request.conversation_id, error = %e, "commit_exchange failed");
        }
    }
}
