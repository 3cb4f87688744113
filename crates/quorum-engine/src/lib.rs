//! The orchestration engine: a recursive plan / execute / observe / replan /
//! synthesize loop that turns a natural-language request into a tool-use
//! plan, fans out tool calls with per-tool deadlines, critically evaluates
//! the intermediate results, and produces a single answer with provenance —
//! narrating the whole way through the progress channel.

pub mod analyze;
pub mod answer;
pub mod deps;
pub mod engine;
pub mod error;
pub mod execute;
pub mod heuristic;
pub mod observe;
pub mod plan;
pub mod sanitize;
pub mod synthesize;

pub use answer::{Confidence, ExecutionSummary, SourceLink, SynthesizedAnswer};
pub use deps::Dependencies;
pub use engine::Orchestrator;
pub use error::EngineError;
pub use plan::{Complexity, ExecutionStep, ExecutionStrategy, Plan, StepStatus};
