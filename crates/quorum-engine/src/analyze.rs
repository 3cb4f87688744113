//! Steps 1–2: analyze the request with a free-form reasoning pass, then
//! extract a structured plan. The reasoning stream drives a small fixed set
//! of curated stage messages on a timer — raw model tokens never reach the
//! progress channel.

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use quorum_core::types::EngineRequest;
use quorum_memory::HybridHistory;
use quorum_model::{ModelError, ModelRequest, ModelTier};
use quorum_progress::{ProgressChannel, ProgressKind};
use quorum_tools::ToolRegistry;

use crate::deps::Dependencies;
use crate::error::EngineError;
use crate::heuristic;
use crate::plan::{parse_plan_json, Plan};

/// Curated, user-visible reasoning stages, rotated as streaming advances.
const REASONING_STAGES: &[&str] = &[
    "Understanding your request…",
    "Considering the best approach…",
    "Thinking about which tools would be most effective…",
    "Planning the optimal strategy…",
    "Structuring my execution plan…",
];

/// Minimum streaming time between stage advances.
const STAGE_INTERVAL: Duration = Duration::from_secs(2);

const FLUID_REASONING_PROMPT: &str = "\
You are an orchestrator for a team chat assistant. Think naturally and \
comprehensively about how to approach the query: what the user is really \
asking, which tools add value, whether tools should run in parallel, and \
what combination gives the most complete answer.

Available tools:
- semantic_search: internal team conversations and past discussions
- web_search: current web information and real-time data
- tickets_and_docs: tickets, wiki pages, and project documentation
- calendar_op: calendar and meeting management

Think through the approach in prose first. End with a structured JSON plan \
containing reasoning_summary, complexity_level (simple|moderate|complex|research), \
tools_needed, execution_strategy (sequential|parallel|hybrid), and per-tool \
queries.";

const PLAN_EXTRACTION_PROMPT: &str = "\
You extract structured execution plans from reasoning text. Return ONLY a \
JSON object with these fields (all optional except tools_needed):
{
  \"reasoning_summary\": \"brief summary\",
  \"complexity_level\": \"simple|moderate|complex|research\",
  \"analysis\": \"key insights about intent and approach\",
  \"tools_needed\": [\"semantic_search\", \"web_search\", \"tickets_and_docs\", \"calendar_op\"],
  \"execution_strategy\": \"sequential|parallel|hybrid\",
  \"semantic_queries\": [\"...\"],
  \"web_queries\": [\"...\"],
  \"ticket_tasks\": [\"...\"],
  \"observation_plan\": \"what to assess in results\",
  \"synthesis_approach\": \"how to combine findings\"
}
No markdown fences, no commentary, no extra fields.";

/// Run analysis and planning. Always yields a plan: model trouble (quota,
/// timeout, malformed JSON) degrades to the keyword heuristic with a
/// warning event rather than failing the request.
pub async fn analyze_and_plan(
    deps: &Dependencies,
    request: &EngineRequest,
    history: &HybridHistory,
    progress: &ProgressChannel,
) -> Result<Plan, EngineError> {
    progress.emit(
        ProgressKind::Reasoning,
        "fluid_reasoning",
        REASONING_STAGES[0],
    );

    let reasoning_deadline = Duration::from_millis(deps.config.deadlines.reasoning_ms);
    let reasoning = match fluid_reasoning(deps, request, history, progress, reasoning_deadline)
        .await
    {
        Ok(text) => text,
        Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
        Err(EngineError::Internal(reason)) => {
            warn!(reason, "fluid reasoning unavailable, using keyword plan");
            progress.emit(
                ProgressKind::Warning,
                "reasoning_fallback",
                "Demand is high right now — using a streamlined approach.",
            );
            return Ok(heuristic::keyword_plan(&request.user_text));
        }
    };

    progress.emit(
        ProgressKind::Processing,
        "plan_extraction",
        "Converting reasoning into an execution plan…",
    );

    match extract_plan(deps, request, &reasoning).await {
        Some(plan) => {
            info!(
                tools = ?plan.tools_needed,
                strategy = ?plan.execution_strategy,
                "plan extracted from reasoning"
            );
            Ok(plan)
        }
        None => {
            warn!("plan extraction failed, using keyword plan");
            progress.emit(
                ProgressKind::Warning,
                "plan_fallback",
                "Falling back to a simpler search strategy.",
            );
            Ok(heuristic::keyword_plan(&request.user_text))
        }
    }
}

/// The free-form reasoning pass. Streams partial output; each ~2s of live
/// streaming advances the curated stage message. Stalled streams stop
/// advancing.
async fn fluid_reasoning(
    deps: &Dependencies,
    request: &EngineRequest,
    history: &HybridHistory,
    progress: &ProgressChannel,
    deadline: Duration,
) -> Result<String, EngineError> {
    let user_prompt = build_context_prompt(request, history);
    let model_req = ModelRequest::new(FLUID_REASONING_PROMPT, user_prompt, ModelTier::Reasoning)
        .with_deadline(deadline)
        .with_max_tokens(20_000);

    let (chunk_tx, mut chunk_rx) = mpsc::channel::<String>(32);
    let model = deps.model.clone();
    let stream_fut = async move { model.generate_streaming(&model_req, chunk_tx).await };
    tokio::pin!(stream_fut);

    let mut stage = 0usize;
    let mut chunks_since_tick = 0usize;
    let mut ticker = tokio::time::interval(STAGE_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // the first tick fires immediately; discard it

    let outer = tokio::time::timeout(deadline + Duration::from_secs(1), async {
        loop {
            tokio::select! {
                result = &mut stream_fut => return result,
                _ = request.cancel.cancelled() => return Err(ModelError::Cancelled),
                Some(_chunk) = chunk_rx.recv() => {
                    chunks_since_tick += 1;
                }
                _ = ticker.tick() => {
                    if chunks_since_tick > 0 && stage + 1 < REASONING_STAGES.len() {
                        stage += 1;
                        chunks_since_tick = 0;
                        progress.emit(
                            ProgressKind::Reasoning,
                            "reasoning_stage",
                            REASONING_STAGES[stage],
                        );
                    }
                }
            }
        }
    })
    .await;

    match outer {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(ModelError::Cancelled)) => Err(EngineError::Cancelled),
        Ok(Err(e)) => {
            if e.is_quota() {
                warn!("reasoning model quota exhausted");
            }
            Err(EngineError::Internal(format!("reasoning failed: {e}")))
        }
        Err(_) => Err(EngineError::Internal("reasoning deadline exceeded".to_string())),
    }
}

/// Second, cheaper pass: pull the structured JSON plan out of the
/// reasoning prose. `None` routes the caller to the heuristic.
async fn extract_plan(
    deps: &Dependencies,
    request: &EngineRequest,
    reasoning: &str,
) -> Option<Plan> {
    let user_prompt = format!(
        "Original query: \"{}\"\n\nReasoning:\n{}\n\nExtract the execution plan as JSON.",
        request.user_text, reasoning
    );
    let model_req = ModelRequest::new(PLAN_EXTRACTION_PROMPT, user_prompt, ModelTier::Fast)
        .with_deadline(Duration::from_millis(deps.config.deadlines.plan_extraction_ms))
        .with_max_tokens(2_048);

    match deps.model.generate(&model_req).await {
        Ok(raw) => {
            let plan = parse_plan_json(&raw);
            if plan.is_none() {
                warn!(raw = %raw.chars().take(200).collect::<String>(), "planner output did not parse");
            }
            plan
        }
        Err(e) => {
            warn!(error = %e, "plan extraction call failed");
            None
        }
    }
}

fn build_context_prompt(request: &EngineRequest, history: &HybridHistory) -> String {
    let mut prompt = String::new();

    if !history.summary_text.is_empty() {
        prompt.push_str("Earlier conversation summary:\n");
        prompt.push_str(&history.summary_text);
        prompt.push_str("\n\n");
    }
    if !history.live_window_text.is_empty() {
        prompt.push_str("Recent conversation:\n");
        prompt.push_str(&history.live_window_text);
        prompt.push_str("\n\n");
    }
    if !history.relevant_entities.is_empty() {
        prompt.push_str("Known entities:\n");
        for entity in &history.relevant_entities {
            prompt.push_str(&format!("- {} ({}): {}\n", entity.value, entity.kind, entity.context));
        }
        prompt.push('\n');
    }
    if let Some(name) = &request.user_profile.first_name {
        prompt.push_str(&format!("User: {name}"));
        if let Some(title) = &request.user_profile.title {
            prompt.push_str(&format!(", {title}"));
        }
        prompt.push('\n');
    }
    if let Some(channel) = &request.channel_context.channel_name {
        prompt.push_str(&format!(
            "Channel: {channel}{}\n",
            if request.channel_context.is_direct {
                " (direct message)"
            } else {
                ""
            }
        ));
    }

    // Available tool catalog, so the planner only names real tools.
    prompt.push_str("\nAvailable tools:\n");
    for (id, description) in ToolRegistry::catalog() {
        prompt.push_str(&format!("- {id}: {description}\n"));
    }

    prompt.push_str(&format!(
        "\nQuery: \"{}\"\n\nThink through this naturally and comprehensively.",
        request.user_text
    ));
    prompt
}
