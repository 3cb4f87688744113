//! Step 4: look at what execution produced and decide whether another round
//! is warranted. The evaluator sees counts and brief summaries, never raw
//! payloads; an all-failure phase short-circuits to a deterministic tool
//! substitution without consulting the model at all.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use quorum_core::types::EngineRequest;
use quorum_model::{ModelRequest, ModelTier};
use quorum_progress::{ProgressChannel, ProgressKind};
use quorum_tools::{ToolKind, ToolOutcome};

use crate::deps::Dependencies;
use crate::heuristic;
use crate::plan::{parse_plan_json, Plan};

/// What the observe phase decided.
#[derive(Debug)]
pub enum Decision {
    /// Results are sufficient (or nothing more can help); synthesize.
    Proceed,
    /// Run another execute phase with this plan.
    Replan(Plan),
}

const EVALUATOR_PROMPT: &str = "\
You judge whether gathered results are sufficient to answer a question. \
Respond with ONLY a JSON object:
{
  \"needs_more_tools\": true or false,
  \"reasoning\": \"brief explanation\",
  \"new_plan\": { \"tools_needed\": [\"...\"], \"semantic_queries\": [\"...\"], \"web_queries\": [\"...\"], \"ticket_tasks\": [\"...\"] } or null
}
No markdown fences, no extra fields.";

/// Untrusted evaluator output.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EvaluatorVerdict {
    needs_more_tools: bool,
    #[allow(dead_code)]
    reasoning: Option<String>,
    new_plan: Option<serde_json::Value>,
}

/// Decide whether to replan. `all_outcomes` is everything accumulated so
/// far; `tried` is the set of tool families already attempted.
pub async fn observe_and_decide(
    deps: &Dependencies,
    request: &EngineRequest,
    all_outcomes: &[ToolOutcome],
    progress: &ProgressChannel,
) -> Decision {
    progress.emit(
        ProgressKind::Observing,
        "observe_results",
        "Reviewing what I found so far…",
    );

    if all_outcomes.is_empty() {
        return Decision::Proceed;
    }

    // Every call failed: substitute a different tool family in the fixed
    // order rather than asking the model about results that don't exist.
    if all_outcomes.iter().all(|o| !o.success) {
        let tried: Vec<ToolKind> = dedup_kinds(all_outcomes);
        return match heuristic::failure_replan(&request.user_text, &tried) {
            Some(plan) => {
                info!(substitute = ?plan.tools_needed, "all tools failed, substituting family");
                Decision::Replan(plan)
            }
            None => {
                info!("all tools failed and no substitute remains");
                Decision::Proceed
            }
        };
    }

    match evaluate_with_model(deps, request, all_outcomes).await {
        Some(Decision::Replan(plan)) => Decision::Replan(plan),
        Some(Decision::Proceed) | None => Decision::Proceed,
    }
}

async fn evaluate_with_model(
    deps: &Dependencies,
    request: &EngineRequest,
    outcomes: &[ToolOutcome],
) -> Option<Decision> {
    let successful = outcomes.iter().filter(|o| o.success).count();
    let failed = outcomes.len() - successful;
    let executed: Vec<&str> = dedup_kinds(outcomes)
        .into_iter()
        .map(|k| k.as_str())
        .collect();

    let user_prompt = format!(
        "Original query: \"{}\"\n\nTool executions: {} total, {} successful, {} failed.\n\
         Tools used: {}.\n\nDo we have enough information to answer comprehensively?",
        request.user_text,
        outcomes.len(),
        successful,
        failed,
        executed.join(", "),
    );

    let model_req = ModelRequest::new(EVALUATOR_PROMPT, user_prompt, ModelTier::Fast)
        .with_deadline(Duration::from_millis(deps.config.deadlines.evaluator_ms))
        .with_max_tokens(1_024);

    let raw = match deps.model.generate(&model_req).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "evaluator call failed, proceeding to synthesis");
            return None;
        }
    };

    let fragment = quorum_model::json::extract_object(&raw)?;
    let verdict: EvaluatorVerdict = match serde_json::from_str(fragment) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "evaluator JSON rejected, proceeding to synthesis");
            return None;
        }
    };

    if !verdict.needs_more_tools {
        return Some(Decision::Proceed);
    }

    let new_plan = verdict
        .new_plan
        .and_then(|v| parse_plan_json(&v.to_string()))
        .filter(|p| !p.tools_needed.is_empty());

    match new_plan {
        Some(plan) => {
            info!(tools = ?plan.tools_needed, "evaluator requested more work");
            Some(Decision::Replan(plan))
        }
        None => {
            warn!("evaluator wanted more tools but gave no usable plan");
            Some(Decision::Proceed)
        }
    }
}

fn dedup_kinds(outcomes: &[ToolOutcome]) -> Vec<ToolKind> {
    let mut seen = BTreeSet::new();
    let mut kinds = Vec::new();
    for outcome in outcomes {
        if seen.insert(outcome.kind.as_str()) {
            kinds.push(outcome.kind);
        }
    }
    kinds
}
