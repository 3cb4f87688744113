use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::calendar::{CalendarAction, CalendarOutcome};
use crate::semantic::SemanticResults;
use crate::tickets::TicketsResult;
use crate::web::WebAnswer;

/// The closed set of tool families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    SemanticSearch,
    WebSearch,
    TicketsDocs,
    CalendarOp,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SemanticSearch => "semantic_search",
            Self::WebSearch => "web_search",
            Self::TicketsDocs => "tickets_and_docs",
            Self::CalendarOp => "calendar_op",
        }
    }

    /// The fixed substitution order used by the deterministic failure
    /// replan: semantic → web → tickets. Calendar has no substitute.
    pub fn failure_substitute(&self) -> Option<ToolKind> {
        match self {
            Self::SemanticSearch => Some(Self::WebSearch),
            Self::WebSearch => Some(Self::TicketsDocs),
            Self::TicketsDocs => None,
            Self::CalendarOp => None,
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured input for one tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolInvocation {
    SemanticSearch {
        query: String,
        top_k: usize,
    },
    WebSearch {
        query: String,
        max_tokens: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        recency: Option<String>,
        #[serde(default)]
        domains: Vec<String>,
    },
    TicketsDocs {
        task: String,
    },
    CalendarOp {
        action: CalendarAction,
    },
}

impl ToolInvocation {
    pub fn kind(&self) -> ToolKind {
        match self {
            Self::SemanticSearch { .. } => ToolKind::SemanticSearch,
            Self::WebSearch { .. } => ToolKind::WebSearch,
            Self::TicketsDocs { .. } => ToolKind::TicketsDocs,
            Self::CalendarOp { .. } => ToolKind::CalendarOp,
        }
    }

    /// Human-readable phrase for "searching …" progress lines. Never raw
    /// JSON — just the operative query text.
    pub fn search_phrase(&self) -> String {
        match self {
            Self::SemanticSearch { query, .. } => {
                format!("team discussions about \u{201c}{query}\u{201d}")
            }
            Self::WebSearch { query, .. } => format!("the web for \u{201c}{query}\u{201d}"),
            Self::TicketsDocs { task } => format!("project tickets and docs: {task}"),
            Self::CalendarOp { action } => format!("calendar: {}", action.verb()),
        }
    }

    /// Short echo of the operative input, stored in the outcome.
    pub fn input_echo(&self) -> String {
        match self {
            Self::SemanticSearch { query, .. } => query.clone(),
            Self::WebSearch { query, .. } => query.clone(),
            Self::TicketsDocs { task } => task.clone(),
            Self::CalendarOp { action } => action.verb().to_string(),
        }
    }

    /// Whether the call is a read that can be retried safely. Calendar
    /// scheduling mutates external state and must not be retried.
    pub fn is_idempotent(&self) -> bool {
        match self {
            Self::CalendarOp { action } => !action.is_mutation(),
            _ => true,
        }
    }
}

/// Errors surfaced by tool adapters. These stay inside [`ToolOutcome`] —
/// the engine never sees them as exceptions.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("transient transport error: {0}")]
    Transient(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    Permission(String),
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Transient(_) => "transient_io",
            ToolError::Auth(_) => "auth_error",
            ToolError::Unavailable(_) => "transient_io",
            ToolError::Permission(_) => "auth_error",
        }
    }

    /// Only transient transport errors are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolError::Transient(_))
    }
}

/// Family-shaped payload inside a successful (or partially successful) call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolPayload {
    Semantic(SemanticResults),
    Web(WebAnswer),
    Tickets(TicketsResult),
    Calendar(CalendarOutcome),
}

/// Uniform result shape across all tools. `success` reflects whether the
/// payload is actually usable, not merely whether the transport worked.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub kind: ToolKind,
    pub input_echo: String,
    pub success: bool,
    pub payload: Option<ToolPayload>,
    pub error: Option<String>,
    pub latency: Duration,
}

impl ToolOutcome {
    pub fn failed(kind: ToolKind, input_echo: String, error: String, latency: Duration) -> Self {
        Self {
            kind,
            input_echo,
            success: false,
            payload: None,
            error: Some(error),
            latency,
        }
    }
}
