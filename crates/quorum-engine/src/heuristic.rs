//! Deterministic planning fallbacks: the keyword plan used when the model
//! is unavailable, and the fixed-order tool substitution used when every
//! call in an Execute phase failed.

use quorum_tools::ToolKind;

use crate::plan::{Complexity, ExecutionStrategy, Plan};

const SEMANTIC_KEYWORDS: &[&str] = &["team", "discussion", "said", "conversation", "chat", "decided"];
const WEB_KEYWORDS: &[&str] = &["current", "latest", "recent", "news", "update", "trend", "trends"];
const TICKET_KEYWORDS: &[&str] = &["jira", "confluence", "ticket", "project", "autopilot", "epic", "sprint"];
const CALENDAR_KEYWORDS: &[&str] = &["meeting", "schedule", "calendar", "availability", "invite"];

/// Keyword-heuristic plan: match a small vocabulary against the query and
/// pick tool families. Defaults to semantic search when nothing matches.
pub fn keyword_plan(user_text: &str) -> Plan {
    let lower = user_text.to_lowercase();
    let mut tools = Vec::new();

    if SEMANTIC_KEYWORDS.iter().any(|k| lower.contains(k)) {
        tools.push(ToolKind::SemanticSearch);
    }
    if WEB_KEYWORDS.iter().any(|k| lower.contains(k)) {
        tools.push(ToolKind::WebSearch);
    }
    if TICKET_KEYWORDS.iter().any(|k| lower.contains(k)) || has_ticket_id(user_text) {
        tools.push(ToolKind::TicketsDocs);
    }
    if CALENDAR_KEYWORDS.iter().any(|k| lower.contains(k)) {
        tools.push(ToolKind::CalendarOp);
    }
    if tools.is_empty() {
        tools.push(ToolKind::SemanticSearch);
    }

    let complexity = if is_greeting(&lower) {
        Complexity::Simple
    } else {
        Complexity::Moderate
    };

    Plan {
        reasoning_summary: "Fallback plan based on keyword analysis".to_string(),
        complexity,
        analysis: format!(
            "Keyword analysis selected: {}",
            tools
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
        semantic_queries: if tools.contains(&ToolKind::SemanticSearch) {
            vec![user_text.to_string()]
        } else {
            Vec::new()
        },
        web_queries: if tools.contains(&ToolKind::WebSearch) {
            vec![user_text.to_string()]
        } else {
            Vec::new()
        },
        ticket_tasks: if tools.contains(&ToolKind::TicketsDocs) {
            vec![format!("Search for information about: {user_text}")]
        } else {
            Vec::new()
        },
        calendar_actions: Vec::new(),
        tools_needed: tools,
        execution_strategy: ExecutionStrategy::Sequential,
        observation_plan: "Check if results directly answer the user's question".to_string(),
        synthesis_approach: "Combine all findings into a comprehensive response".to_string(),
    }
}

/// Replacement plan after an Execute phase where every call failed:
/// substitute the next tool family in the fixed order semantic → web →
/// tickets. Returns `None` when no untried substitute remains.
pub fn failure_replan(user_text: &str, tried: &[ToolKind]) -> Option<Plan> {
    let mut candidate = None;
    for kind in tried {
        let mut next = kind.failure_substitute();
        while let Some(sub) = next {
            if !tried.contains(&sub) {
                candidate = Some(sub);
                break;
            }
            next = sub.failure_substitute();
        }
        if candidate.is_some() {
            break;
        }
    }

    let substitute = candidate?;
    let mut plan = keyword_plan(user_text);
    plan.reasoning_summary = format!(
        "Substituting {} after the previous tool family failed",
        substitute.as_str()
    );
    plan.analysis = plan.reasoning_summary.clone();
    plan.tools_needed = vec![substitute];
    plan.semantic_queries = Vec::new();
    plan.web_queries = Vec::new();
    plan.ticket_tasks = Vec::new();
    match substitute {
        ToolKind::SemanticSearch => plan.semantic_queries = vec![user_text.to_string()],
        ToolKind::WebSearch => plan.web_queries = vec![user_text.to_string()],
        ToolKind::TicketsDocs => {
            plan.ticket_tasks = vec![format!("Search for information about: {user_text}")]
        }
        ToolKind::CalendarOp => {}
    }
    Some(plan)
}

fn has_ticket_id(text: &str) -> bool {
    // Cheap scan for PROJ-123 shapes without pulling a regex in here.
    text.split_whitespace().any(|word| {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '-');
        let Some((prefix, digits)) = word.split_once('-') else {
            return false;
        };
        prefix.len() >= 2
            && prefix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            && prefix.chars().next().is_some_and(|c| c.is_ascii_uppercase())
            && !digits.is_empty()
            && digits.chars().all(|c| c.is_ascii_digit())
    })
}

fn is_greeting(lower: &str) -> bool {
    let words = lower.split_whitespace().count();
    words <= 4
        && ["hey", "hi", "hello", "yo", "morning", "thanks", "thank"]
            .iter()
            .any(|g| lower.contains(g))
}
