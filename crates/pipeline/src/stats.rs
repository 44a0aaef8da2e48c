use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// Counters owned by one dispatch worker; only that worker writes them.
#[derive(Debug, Default)]
pub(crate) struct WorkerStats {
    processed: AtomicU64,
    started: OnceLock<Instant>,
}

impl WorkerStats {
    pub(crate) fn mark_started(&self) {
        let _ = self.started.set(Instant::now());
    }

    pub(crate) fn record(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Live rate since this worker started, or `None` before it has run.
    pub(crate) fn rate(&self) -> Option<f64> {
        let elapsed = self.started.get()?.elapsed().as_secs_f64();
        (elapsed > 0.0).then(|| self.processed() as f64 / elapsed)
    }
}

/// Final accounting returned by [`crate::Pipeline::join`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Commands consumed by dispatch, including ones the backend skipped.
    pub commands_processed: u64,
    pub per_worker: Vec<u64>,
    pub sources_decoded: u64,
    pub sources_dropped: u64,
    pub commands_skipped: u64,
}
