use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Summary regression: covered_turn_count {new} < {current}")]
    SummaryRegression { new: usize, current: usize },

    #[error("Not found: {key}")]
    NotFound { key: String },
}

pub type Result<T> = std::result::Result<T, MemoryError>;
