use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Live-window defaults. These are config knobs, not contracts — the memory
/// manager reads whatever the loaded config says.
pub const DEFAULT_MAX_LIVE_TURNS: usize = 10;
pub const DEFAULT_MAX_LIVE_TOKENS: usize = 2000;
pub const DEFAULT_PRESERVE_RECENT: usize = 2;
pub const DEFAULT_MAX_REPLANNING_ITERATIONS: usize = 3;

/// Top-level config (quorum.toml + QUORUM_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumConfig {
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub deadlines: DeadlineConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            models: ModelsConfig::default(),
            deadlines: DeadlineConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

/// Hybrid-history and entity-store knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_max_live_turns")]
    pub max_live_turns: usize,
    #[serde(default = "default_max_live_tokens")]
    pub max_live_tokens: usize,
    #[serde(default = "default_preserve_recent")]
    pub preserve_recent: usize,
    /// Tokenizer identifier resolved by the token accountant (tiktoken BPE name).
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,
    /// Author names treated as the assistant when tokenizing turns.
    #[serde(default = "default_bot_names")]
    pub bot_names: Vec<String>,
    /// Ceiling applied to entity relevance scores after the AI-merge boost.
    #[serde(default = "default_score_ceiling")]
    pub entity_score_ceiling: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_live_turns: default_max_live_turns(),
            max_live_tokens: default_max_live_tokens(),
            preserve_recent: default_preserve_recent(),
            tokenizer: default_tokenizer(),
            bot_names: default_bot_names(),
            entity_score_ceiling: default_score_ceiling(),
        }
    }
}

/// Model tier names and client pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// High-capability model used for fluid reasoning and synthesis.
    #[serde(default = "default_reasoning_model")]
    pub reasoning: String,
    /// Cheap, low-latency model used for extraction and evaluation.
    #[serde(default = "default_fast_model")]
    pub fast: String,
    /// Minimum spacing between successive calls to the same client, in ms.
    #[serde(default = "default_rate_interval_ms")]
    pub rate_interval_ms: u64,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            reasoning: default_reasoning_model(),
            fast: default_fast_model(),
            rate_interval_ms: default_rate_interval_ms(),
        }
    }
}

/// Per-step deadlines (all in milliseconds) and the request-level bounds.
///
/// The reasoning deadline is 15s, not 25s: the longer budget produced a worse
/// cancel-vs-success ratio in production traces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineConfig {
    #[serde(default = "default_reasoning_ms")]
    pub reasoning_ms: u64,
    #[serde(default = "default_plan_extraction_ms")]
    pub plan_extraction_ms: u64,
    #[serde(default = "default_evaluator_ms")]
    pub evaluator_ms: u64,
    #[serde(default = "default_synthesis_ms")]
    pub synthesis_ms: u64,
    #[serde(default = "default_tool_ms")]
    pub tool_ms: u64,
    /// Soft budget for the entire request; expiry forces synthesis.
    #[serde(default = "default_request_budget_ms")]
    pub request_budget_ms: u64,
    /// Grace window given to in-flight tool calls on cancellation.
    #[serde(default = "default_cancel_grace_ms")]
    pub cancel_grace_ms: u64,
    /// Replanning hard cap per request.
    #[serde(default = "default_max_replans")]
    pub max_replanning_iterations: usize,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            reasoning_ms: default_reasoning_ms(),
            plan_extraction_ms: default_plan_extraction_ms(),
            evaluator_ms: default_evaluator_ms(),
            synthesis_ms: default_synthesis_ms(),
            tool_ms: default_tool_ms(),
            request_budget_ms: default_request_budget_ms(),
            cancel_grace_ms: default_cancel_grace_ms(),
            max_replanning_iterations: default_max_replans(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_max_live_turns() -> usize {
    DEFAULT_MAX_LIVE_TURNS
}
fn default_max_live_tokens() -> usize {
    DEFAULT_MAX_LIVE_TOKENS
}
fn default_preserve_recent() -> usize {
    DEFAULT_PRESERVE_RECENT
}
fn default_max_replans() -> usize {
    DEFAULT_MAX_REPLANNING_ITERATIONS
}
fn default_tokenizer() -> String {
    "cl100k_base".to_string()
}
fn default_bot_names() -> Vec<String> {
    vec![
        "bot".to_string(),
        "assistant".to_string(),
        "quorum".to_string(),
    ]
}
fn default_score_ceiling() -> f64 {
    2.0
}
fn default_reasoning_model() -> String {
    "gemini-2.5-pro".to_string()
}
fn default_fast_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_rate_interval_ms() -> u64 {
    100
}
fn default_reasoning_ms() -> u64 {
    15_000
}
fn default_plan_extraction_ms() -> u64 {
    8_000
}
fn default_evaluator_ms() -> u64 {
    10_000
}
fn default_synthesis_ms() -> u64 {
    12_000
}
fn default_tool_ms() -> u64 {
    30_000
}
fn default_request_budget_ms() -> u64 {
    90_000
}
fn default_cancel_grace_ms() -> u64 {
    2_000
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.quorum/quorum.db", home)
}

impl QuorumConfig {
    /// Load config from a TOML file with QUORUM_* env var overrides.
    ///
    /// Checks the explicit path argument first, then ~/.quorum/quorum.toml.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: QuorumConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("QUORUM_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.quorum/quorum.toml", home)
}
