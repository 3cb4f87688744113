use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    #[error("Deadline exceeded after {ms}ms")]
    Timeout { ms: u64 },

    #[error("Model quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Unparseable model output: {0}")]
    Parse(String),

    #[error("Upstream rejected credentials: {0}")]
    Auth(String),

    #[error("No usable content returned")]
    Empty,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invariant violated: {0}")]
    InvariantViolated(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Short error-kind code used in log fields and progress events.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "config",
            CoreError::TransientIo(_) => "transient_io",
            CoreError::Timeout { .. } => "timeout",
            CoreError::QuotaExhausted(_) => "quota_exhausted",
            CoreError::Parse(_) => "parse_error",
            CoreError::Auth(_) => "auth_error",
            CoreError::Empty => "empty",
            CoreError::Cancelled => "cancelled",
            CoreError::Storage(_) => "storage",
            CoreError::InvariantViolated(_) => "invariant_violated",
            CoreError::Serialization(_) => "parse_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
