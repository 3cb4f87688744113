//! Background learners: best-effort tasks fired after each turn. The
//! summarizer folds evicted window turns into the long-term narrative; the
//! extractor mines committed exchanges for structured entities. Both
//! receive their inputs by value, absorb every error, and only log.

pub mod extractor;
pub mod pool;
pub mod summarizer;

pub use pool::WorkerPool;
