use quorum_core::types::{ConversationId, Turn};

/// Work item for the background summarizer: fold the evicted turns into the
/// existing narrative summary. Carried by value — the worker never shares
/// mutable state with the foreground.
#[derive(Debug, Clone)]
pub struct SummarizeJob {
    pub conversation_id: ConversationId,
    pub evicted_turns: Vec<Turn>,
    pub existing_summary: String,
}

/// Work item for the background entity extractor: mine the committed
/// (query, answer) pair for structured facts.
#[derive(Debug, Clone)]
pub struct ExtractJob {
    pub conversation_id: ConversationId,
    pub query: String,
    pub answer: String,
    pub user_name: String,
    pub context: String,
}
