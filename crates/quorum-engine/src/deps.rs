use std::sync::Arc;

use quorum_core::QuorumConfig;
use quorum_memory::MemoryManager;
use quorum_model::ModelClient;
use quorum_tools::ToolRegistry;

/// Everything the engine talks to, injected at construction.
///
/// There are no ambient singletons: tests build this bundle from scripted
/// fakes (a model client whose failures are scheduled, tool adapters that
/// return canned payloads) and drive the engine end to end.
#[derive(Clone)]
pub struct Dependencies {
    pub model: Arc<dyn ModelClient>,
    pub tools: Arc<ToolRegistry>,
    pub memory: Arc<MemoryManager>,
    pub config: Arc<QuorumConfig>,
}

impl Dependencies {
    pub fn new(
        model: Arc<dyn ModelClient>,
        tools: Arc<ToolRegistry>,
        memory: Arc<MemoryManager>,
        config: Arc<QuorumConfig>,
    ) -> Self {
        Self {
            model,
            tools,
            memory,
            config,
        }
    }
}
