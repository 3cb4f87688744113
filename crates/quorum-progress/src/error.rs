use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("channel already has a subscriber")]
    AlreadySubscribed,

    #[error("channel is closed")]
    Closed,
}
