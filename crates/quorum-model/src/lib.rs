//! Model client layer: the `ModelClient` trait every engine step talks to,
//! the HTTP-backed Gemini implementation, a global rate gate, and helpers
//! for digging JSON out of model prose.

pub mod client;
pub mod gate;
pub mod gemini;
pub mod json;

pub use client::{ModelClient, ModelError, ModelRequest, ModelTier};
pub use gate::RateGate;
pub use gemini::GeminiClient;
