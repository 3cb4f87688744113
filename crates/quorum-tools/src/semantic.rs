use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::ToolError;

/// One ranked hit from the semantic index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticHit {
    pub content: String,
    pub score: f64,
    #[serde(default)]
    pub source_metadata: serde_json::Map<String, serde_json::Value>,
}

/// Results of one semantic search, including index-level metadata that may
/// arrive even when the hit list is empty (partial availability).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticResults {
    pub hits: Vec<SemanticHit>,
    #[serde(default)]
    pub index_metadata: serde_json::Map<String, serde_json::Value>,
}

/// Adapter over the vector store. Authentication and connection pooling are
/// the adapter's responsibility.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<SemanticResults, ToolError>;
}
