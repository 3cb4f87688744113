//! Step 3: walk the plan's tool list, fan out per the execution strategy,
//! and narrate each call with a searching event, a compact preview, and a
//! completion entry in the step log.

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info};

use quorum_core::types::EngineRequest;
use quorum_progress::{ProgressChannel, ProgressKind};
use quorum_tools::{ToolInvocation, ToolOutcome, ToolPayload};

use crate::deps::Dependencies;
use crate::error::EngineError;
use crate::plan::{ExecutionStrategy, Plan, StepLog, StepStatus};

/// Preview events carry at most this many compact items.
const PREVIEW_ITEMS: usize = 3;

/// Execute every invocation in the plan. Returns the accumulated outcomes,
/// or `Cancelled` if the request was cancelled mid-phase (in-flight calls
/// get a short grace window, then are abandoned).
pub async fn run_execute_phase(
    deps: &Dependencies,
    request: &EngineRequest,
    plan: &Plan,
    steps: &mut StepLog,
    progress: &ProgressChannel,
) -> Result<Vec<ToolOutcome>, EngineError> {
    let invocations = plan.invocations(&request.user_text);
    if invocations.is_empty() {
        debug!("plan needs no tools, skipping execute phase");
        return Ok(Vec::new());
    }

    let outcomes = match plan.execution_strategy {
        ExecutionStrategy::Sequential => {
            let mut outcomes = Vec::with_capacity(invocations.len());
            for invocation in &invocations {
                if request.cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                outcomes.push(call_one(deps, request, invocation, progress).await?);
            }
            outcomes
        }
        ExecutionStrategy::Parallel => {
            fan_out(deps, request, &invocations, progress).await?
        }
        ExecutionStrategy::Hybrid => {
            // Same-tool calls fan out together; distinct tools chain in
            // first-appearance order.
            let mut groups: BTreeMap<usize, Vec<ToolInvocation>> = BTreeMap::new();
            let mut order: Vec<quorum_tools::ToolKind> = Vec::new();
            for invocation in invocations {
                let kind = invocation.kind();
                let slot = match order.iter().position(|k| *k == kind) {
                    Some(i) => i,
                    None => {
                        order.push(kind);
                        order.len() - 1
                    }
                };
                groups.entry(slot).or_default().push(invocation);
            }

            let mut outcomes = Vec::new();
            for (_, group) in groups {
                if request.cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                outcomes.extend(fan_out(deps, request, &group, progress).await?);
            }
            outcomes
        }
    };

    record_steps(steps, &outcomes);
    summarize_phase(&outcomes, progress);
    Ok(outcomes)
}

/// Run one tool call, narrating around it. Each tool's preview event always
/// precedes its completion; between concurrent tools, events interleave in
/// arrival order.
async fn call_one(
    deps: &Dependencies,
    request: &EngineRequest,
    invocation: &ToolInvocation,
    progress: &ProgressChannel,
) -> Result<ToolOutcome, EngineError> {
    progress.emit(
        ProgressKind::Searching,
        invocation.kind().as_str(),
        &format!("Searching {}…", invocation.search_phrase()),
    );

    let deadline = Duration::from_millis(deps.config.deadlines.tool_ms);
    let grace = Duration::from_millis(deps.config.deadlines.cancel_grace_ms);

    let call = deps.tools.call(invocation, deadline);
    tokio::pin!(call);

    let outcome = tokio::select! {
        outcome = &mut call => outcome,
        _ = request.cancel.cancelled() => {
            // Give the in-flight call a grace window, then abandon it. No
            // further events are emitted once cancellation is acknowledged.
            let _ = tokio::time::timeout(grace, &mut call).await;
            return Err(EngineError::Cancelled);
        }
    };

    emit_preview(&outcome, progress);
    Ok(outcome)
}

async fn fan_out(
    deps: &Dependencies,
    request: &EngineRequest,
    invocations: &[ToolInvocation],
    progress: &ProgressChannel,
) -> Result<Vec<ToolOutcome>, EngineError> {
    let grace = Duration::from_millis(deps.config.deadlines.cancel_grace_ms);
    let calls = join_all(
        invocations
            .iter()
            .map(|invocation| call_one(deps, request, invocation, progress)),
    );
    tokio::pin!(calls);

    let results = tokio::select! {
        results = &mut calls => results,
        _ = request.cancel.cancelled() => {
            let _ = tokio::time::timeout(grace, &mut calls).await;
            return Err(EngineError::Cancelled);
        }
    };

    results.into_iter().collect()
}

/// Emit a compact preview of what came back — selected fields only, never
/// raw JSON.
fn emit_preview(outcome: &ToolOutcome, progress: &ProgressChannel) {
    if !outcome.success {
        progress.emit(
            ProgressKind::Processing,
            outcome.kind.as_str(),
            &format!(
                "Had trouble with {} — continuing with other sources…",
                outcome.kind
            ),
        );
        return;
    }

    let items = preview_items(outcome);
    let details = if items.is_empty() {
        format!("Got results from {}.", outcome.kind)
    } else {
        format!("Found {}: {}", plural(items.len()), items.join("; "))
    };
    progress.emit(ProgressKind::Discovery, outcome.kind.as_str(), &details);
}

fn preview_items(outcome: &ToolOutcome) -> Vec<String> {
    let Some(payload) = &outcome.payload else {
        return Vec::new();
    };
    match payload {
        ToolPayload::Semantic(results) => results
            .hits
            .iter()
            .take(PREVIEW_ITEMS)
            .map(|hit| truncate(&hit.content, 80))
            .collect(),
        ToolPayload::Web(answer) => answer
            .citations
            .iter()
            .take(PREVIEW_ITEMS)
            .map(|c| c.title.clone())
            .collect(),
        ToolPayload::Tickets(result) => result
            .items
            .iter()
            .take(PREVIEW_ITEMS)
            .map(|item| item.title.clone())
            .collect(),
        ToolPayload::Calendar(outcome) => vec![truncate(&outcome.detail, 80)],
    }
}

fn record_steps(steps: &mut StepLog, outcomes: &[ToolOutcome]) {
    for outcome in outcomes {
        let action_id = format!("execute_{}", outcome.kind.as_str());
        let status = if outcome.success {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        let summary = match &outcome.error {
            Some(e) => e.clone(),
            None => format!("{} returned usable results", outcome.kind),
        };
        steps.update(&action_id, status, &summary);
    }
}

fn summarize_phase(outcomes: &[ToolOutcome], progress: &ProgressChannel) {
    let successful = outcomes.iter().filter(|o| o.success).count();
    info!(
        total = outcomes.len(),
        successful, "execute phase complete"
    );
    if successful > 0 {
        progress.emit(
            ProgressKind::Processing,
            "gathering",
            &format!(
                "Gathered information from {successful}/{} sources — analyzing what I found…",
                outcomes.len()
            ),
        );
    } else if !outcomes.is_empty() {
        progress.emit(
            ProgressKind::Processing,
            "gathering",
            "Hit some roadblocks gathering information — working with what I can access…",
        );
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}

fn plural(n: usize) -> String {
    if n == 1 {
        "1 result".to_string()
    } else {
        format!("{n} results")
    }
}
