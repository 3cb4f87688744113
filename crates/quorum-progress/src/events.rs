use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of state change an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Reasoning,
    Searching,
    Discovery,
    Processing,
    Synthesizing,
    Observing,
    Replanning,
    Generating,
    Warning,
    Error,
    Retry,
}

impl ProgressKind {
    /// Terminal entries survive display compression.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressKind::Warning | ProgressKind::Error)
    }
}

impl std::fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Reasoning => "reasoning",
            Self::Searching => "searching",
            Self::Discovery => "discovery",
            Self::Processing => "processing",
            Self::Synthesizing => "synthesizing",
            Self::Observing => "observing",
            Self::Replanning => "replanning",
            Self::Generating => "generating",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Retry => "retry",
        };
        write!(f, "{s}")
    }
}

/// One typed state-change notification for an in-flight request.
///
/// `seq` is per-request monotonic; subscribers can rely on it even when
/// deliveries are coalesced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub kind: ProgressKind,
    pub action: String,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_snippet: Option<String>,
    pub seq: u64,
    pub at: DateTime<Utc>,
}

impl ProgressEvent {
    /// Single display line for this event.
    pub fn display_line(&self) -> String {
        if self.details.is_empty() {
            format!("{}…", title_case(&self.action.replace('_', " ")))
        } else {
            self.details.clone()
        }
    }
}

fn title_case(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + c.as_str(),
    }
}
