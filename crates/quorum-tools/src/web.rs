use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::ToolError;

/// One cited source backing a web answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

/// A synthesized web-search answer with its citations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebAnswer {
    pub content: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    /// Token usage reported by the upstream API.
    #[serde(default)]
    pub usage_tokens: u32,
}

/// Adapter over the external web-search API.
#[async_trait]
pub trait WebSearcher: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_tokens: u32,
        recency: Option<&str>,
        domains: &[String],
    ) -> Result<WebAnswer, ToolError>;
}
