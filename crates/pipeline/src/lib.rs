//! Concurrent replay runtime for translated shader commands.
//!
//! ```text
//!   submit(text) ──▶ decode_queue ──▶ [decode] ──▶ prepare_queue ──▶ [prepare]
//!                                                                       │
//!        Backend ◀── [dispatch × n] ◀── dispatch_queue ◀────────────────┘
//! ```
//!
//! All stage workers run on one [`WorkerPool`]; the queues are
//! [`LockFreeQueue`]s.
mod pool;
mod queue;
mod runtime;
mod stats;

pub use pool::WorkerPool;
pub use queue::LockFreeQueue;
pub use runtime::{
    Pipeline, PipelineConfig, PipelineError, PipelineEvent, PipelineState, SourceId,
    DEFAULT_DISPATCH_WORKERS, EVENT_CAPACITY, MAX_DISPATCH_WORKERS, MIN_DISPATCH_WORKERS,
};
pub use stats::PipelineSummary;
