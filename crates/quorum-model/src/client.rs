use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// Which class of model a step wants. Concrete model ids are resolved from
/// config by the client implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// High-capability model: fluid reasoning, synthesis.
    Reasoning,
    /// Cheap low-latency model: plan extraction, evaluation, entity extraction.
    Fast,
}

/// A single generation request.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub user: String,
    pub tier: ModelTier,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Hard deadline for this call. Implementations must return
    /// [`ModelError::Timeout`] rather than hang past it.
    pub deadline: Duration,
}

impl ModelRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, tier: ModelTier) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            tier,
            max_tokens: 4096,
            temperature: 0.3,
            deadline: Duration::from_secs(15),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Common interface for all model providers.
///
/// Implementations must surface quota saturation as the distinguished
/// [`ModelError::QuotaExhausted`] variant so the engine can fall back tiers.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Send a request, wait for the full response text.
    async fn generate(&self, req: &ModelRequest) -> Result<String, ModelError>;

    /// Stream partial text through a channel, returning the full text.
    /// Default: falls back to non-streaming generate, emits one chunk.
    async fn generate_streaming(
        &self,
        req: &ModelRequest,
        chunks: mpsc::Sender<String>,
    ) -> Result<String, ModelError> {
        let text = self.generate(req).await?;
        let _ = chunks.send(text.clone()).await;
        Ok(text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("deadline exceeded after {0:?}")]
    Timeout(Duration),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ModelError {
    /// True when the engine should drop to a cheaper tier and retry.
    pub fn is_quota(&self) -> bool {
        matches!(self, ModelError::QuotaExhausted(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ModelError::Http(_) => "transient_io",
            ModelError::Api { .. } => "transient_io",
            ModelError::QuotaExhausted(_) => "quota_exhausted",
            ModelError::Parse(_) => "parse_error",
            ModelError::Timeout(_) => "timeout",
            ModelError::Auth(_) => "auth_error",
            ModelError::Unavailable(_) => "transient_io",
            ModelError::Cancelled => "cancelled",
        }
    }
}
