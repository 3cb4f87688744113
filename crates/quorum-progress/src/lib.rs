//! Progress channel: ordered, best-effort delivery of typed state-change
//! events from the engine to at most one observer per request. The observer
//! renders them by editing a single placeholder message, so every delivery
//! carries the full rendered transcript — the subscriber keeps no state.

pub mod channel;
pub mod error;
pub mod events;

pub use channel::{Delivery, ProgressChannel, ProgressSubscriber};
pub use error::ProgressError;
pub use events::{ProgressEvent, ProgressKind};
