use serde::{Deserialize, Serialize};

/// How much the engine trusts its own answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// One provenance link. `url` is always an absolute URL and `title` is
/// never empty — the egress adapter relies on both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceLink {
    pub title: String,
    pub url: String,
    /// "web", "jira", or "confluence".
    #[serde(rename = "type")]
    pub link_type: String,
}

/// Roll-up of what happened while serving the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub steps_completed: usize,
    pub total_steps: usize,
    pub replanning_iterations: usize,
}

/// The single final object returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedAnswer {
    pub text: String,
    /// At most five.
    pub key_findings: Vec<String>,
    /// At most five, deduplicated by URL.
    pub source_links: Vec<SourceLink>,
    pub confidence: Confidence,
    /// At most four, deduplicated case-insensitively.
    pub suggested_followups: Vec<String>,
    pub requires_human_input: bool,
    pub execution_summary: ExecutionSummary,
}

impl SynthesizedAnswer {
    /// The canned degraded answer used when a step fails unrecoverably.
    pub fn fallback(text: impl Into<String>, summary: ExecutionSummary) -> Self {
        Self {
            text: text.into(),
            key_findings: Vec::new(),
            source_links: Vec::new(),
            confidence: Confidence::Low,
            suggested_followups: vec![
                "Could you rephrase your question?".to_string(),
                "What specific aspect would you like to know more about?".to_string(),
            ],
            requires_human_input: true,
            execution_summary: summary,
        }
    }
}
