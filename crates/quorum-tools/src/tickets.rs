use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::ToolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkItemType {
    Confluence,
    Jira,
}

impl std::fmt::Display for WorkItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Confluence => write!(f, "confluence"),
            Self::Jira => write!(f, "jira"),
        }
    }
}

/// One normalized ticket or wiki page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub title: String,
    pub url: String,
    #[serde(rename = "type")]
    pub item_type: WorkItemType,
    #[serde(default)]
    pub summary: String,
}

/// Result of a natural-language task against the ticket/doc system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketsResult {
    /// "success" when the upstream completed the task.
    pub status: String,
    #[serde(default)]
    pub items: Vec<WorkItem>,
    /// How the upstream routed the task (passed through, not interpreted).
    #[serde(default)]
    pub execution_method: String,
}

impl TicketsResult {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Adapter over the ticket + wiki system, driven by natural-language tasks.
#[async_trait]
pub trait TicketsDocsClient: Send + Sync {
    async fn execute_task(&self, task: &str) -> Result<TicketsResult, ToolError>;
}
