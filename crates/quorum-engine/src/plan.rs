use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use quorum_tools::{CalendarAction, ToolInvocation, ToolKind};

/// How hard the planner judged the request to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    Research,
}

/// How planned tool calls are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    /// Strictly ordered, one tool at a time.
    Sequential,
    /// All planned calls fan out concurrently.
    Parallel,
    /// Same-tool calls fan out, different tools chain.
    Hybrid,
}

/// The engine's structured intent for a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub reasoning_summary: String,
    pub complexity: Complexity,
    pub analysis: String,
    pub tools_needed: Vec<ToolKind>,
    pub execution_strategy: ExecutionStrategy,
    pub semantic_queries: Vec<String>,
    pub web_queries: Vec<String>,
    pub ticket_tasks: Vec<String>,
    pub calendar_actions: Vec<CalendarAction>,
    pub observation_plan: String,
    pub synthesis_approach: String,
}

impl Plan {
    /// Expand the plan into concrete tool invocations, in `tools_needed`
    /// order. A tool listed with no arguments falls back to the raw query.
    pub fn invocations(&self, user_text: &str) -> Vec<ToolInvocation> {
        let mut calls = Vec::new();
        for kind in &self.tools_needed {
            match kind {
                ToolKind::SemanticSearch => {
                    let queries = non_empty_or(&self.semantic_queries, user_text);
                    for query in queries {
                        calls.push(ToolInvocation::SemanticSearch { query, top_k: 5 });
                    }
                }
                ToolKind::WebSearch => {
                    let queries = non_empty_or(&self.web_queries, user_text);
                    for query in queries {
                        calls.push(ToolInvocation::WebSearch {
                            query,
                            max_tokens: 2000,
                            recency: None,
                            domains: Vec::new(),
                        });
                    }
                }
                ToolKind::TicketsDocs => {
                    let tasks = non_empty_or(
                        &self.ticket_tasks,
                        &format!("Search for information about: {user_text}"),
                    );
                    for task in tasks {
                        calls.push(ToolInvocation::TicketsDocs { task });
                    }
                }
                ToolKind::CalendarOp => {
                    if self.calendar_actions.is_empty() {
                        calls.push(ToolInvocation::CalendarOp {
                            action: CalendarAction::FindTimes {
                                attendees: Vec::new(),
                                duration_minutes: 30,
                            },
                        });
                    }
                    for action in &self.calendar_actions {
                        calls.push(ToolInvocation::CalendarOp {
                            action: action.clone(),
                        });
                    }
                }
            }
        }
        calls
    }
}

fn non_empty_or(list: &[String], fallback: &str) -> Vec<String> {
    if list.is_empty() {
        vec![fallback.to_string()]
    } else {
        list.to_vec()
    }
}

/// Status of one step in the execution log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// One entry in the append-only per-request execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub step_index: usize,
    pub action_id: String,
    pub description: String,
    pub status: StepStatus,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub result_summary: String,
}

/// Ordered, append-only step log for one request.
#[derive(Debug, Clone, Default)]
pub struct StepLog {
    steps: Vec<ExecutionStep>,
}

impl StepLog {
    pub fn add(&mut self, action_id: impl Into<String>, description: impl Into<String>) {
        self.steps.push(ExecutionStep {
            step_index: self.steps.len() + 1,
            action_id: action_id.into(),
            description: description.into(),
            status: StepStatus::Pending,
            updated_at: Utc::now(),
            result_summary: String::new(),
        });
    }

    pub fn update(&mut self, action_id: &str, status: StepStatus, result_summary: &str) {
        if let Some(step) = self.steps.iter_mut().find(|s| s.action_id == action_id) {
            step.status = status;
            step.updated_at = Utc::now();
            if !result_summary.is_empty() {
                step.result_summary = result_summary.to_string();
            }
        }
    }

    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    pub fn completed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Untrusted planner output. Unknown fields are rejected; missing optional
/// fields are tolerated.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanDraft {
    reasoning_summary: Option<String>,
    complexity_level: Option<String>,
    analysis: Option<String>,
    tools_needed: Option<Vec<String>>,
    execution_strategy: Option<String>,
    semantic_queries: Option<Vec<String>>,
    web_queries: Option<Vec<String>>,
    ticket_tasks: Option<Vec<String>>,
    calendar_actions: Option<Vec<CalendarAction>>,
    observation_plan: Option<String>,
    synthesis_approach: Option<String>,
}

/// Parse the planner's JSON into a [`Plan`].
///
/// Returns `None` when the fragment doesn't parse or names no usable tool;
/// the caller falls back to the keyword heuristic.
pub fn parse_plan_json(raw: &str) -> Option<Plan> {
    let fragment = quorum_model::json::extract_object(raw)?;
    let draft: PlanDraft = match serde_json::from_str(fragment) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "planner JSON rejected");
            return None;
        }
    };

    let mut tools_needed = Vec::new();
    for name in draft.tools_needed.unwrap_or_default() {
        match parse_tool_name(&name) {
            Some(kind) => {
                if !tools_needed.contains(&kind) {
                    tools_needed.push(kind);
                }
            }
            None => warn!(tool = %name, "planner named an unknown tool, skipping"),
        }
    }

    Some(Plan {
        reasoning_summary: draft.reasoning_summary.unwrap_or_default(),
        complexity: parse_complexity(draft.complexity_level.as_deref()),
        analysis: draft.analysis.unwrap_or_default(),
        tools_needed,
        execution_strategy: parse_strategy(draft.execution_strategy.as_deref()),
        semantic_queries: draft.semantic_queries.unwrap_or_default(),
        web_queries: draft.web_queries.unwrap_or_default(),
        ticket_tasks: draft.ticket_tasks.unwrap_or_default(),
        calendar_actions: draft.calendar_actions.unwrap_or_default(),
        observation_plan: draft.observation_plan.unwrap_or_default(),
        synthesis_approach: draft.synthesis_approach.unwrap_or_default(),
    })
}

fn parse_tool_name(name: &str) -> Option<ToolKind> {
    match name {
        "semantic_search" => Some(ToolKind::SemanticSearch),
        "web_search" => Some(ToolKind::WebSearch),
        "tickets_and_docs" => Some(ToolKind::TicketsDocs),
        "calendar_op" => Some(ToolKind::CalendarOp),
        _ => None,
    }
}

fn parse_complexity(s: Option<&str>) -> Complexity {
    match s {
        Some("simple") => Complexity::Simple,
        Some("complex") => Complexity::Complex,
        Some("research") => Complexity::Research,
        _ => Complexity::Moderate,
    }
}

fn parse_strategy(s: Option<&str>) -> ExecutionStrategy {
    match s {
        Some("parallel") => ExecutionStrategy::Parallel,
        Some("hybrid") => ExecutionStrategy::Hybrid,
        _ => ExecutionStrategy::Sequential,
    }
}
