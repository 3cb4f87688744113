use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The request was cancelled; no answer was produced.
    #[error("request cancelled")]
    Cancelled,

    /// An internal invariant broke. The engine converts these into fallback
    /// answers at the process boundary; seeing one escape is a bug.
    #[error("internal engine error: {0}")]
    Internal(String),
}
