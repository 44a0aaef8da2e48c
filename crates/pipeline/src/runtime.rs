use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use shaderasm::{Constant, Instruction};
use thiserror::Error;
use tracing::{debug, info, warn};
use translator::{
    load_program_at, translate_constant, translate_instruction, Backend, Command, CommandKind,
    CommandList, CompileOptions, Diagnostic, DispatchError,
};

use crate::pool::WorkerPool;
use crate::queue::LockFreeQueue;
use crate::stats::{PipelineSummary, WorkerStats};

pub const MIN_DISPATCH_WORKERS: usize = 1;
pub const MAX_DISPATCH_WORKERS: usize = 64;
pub const DEFAULT_DISPATCH_WORKERS: usize = 2;
/// Events beyond this many unread ones are discarded.
pub const EVENT_CAPACITY: usize = 1024;

/// Decode and prepare always get one worker each, on top of dispatch.
const STAGE_WORKERS: usize = 2;

/// Identifier handed out by [`Pipeline::submit`], in submission order.
pub type SourceId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub dispatch_workers: usize,
    /// Fallback `#include` directory for submitted sources.
    pub include_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dispatch_workers: DEFAULT_DISPATCH_WORKERS,
            include_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Initialized,
    Running,
    Stopping,
    Joined,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
            PipelineState::Joined => "joined",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to spawn pipeline workers: {0}")]
    Spawn(#[source] io::Error),

    #[error("cannot {operation} a pipeline that is {state}")]
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },
}

/// Something a stage worker gave up on; the pipeline itself keeps going.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    SourceDropped {
        source: SourceId,
        reason: String,
    },
    TranslationDegraded {
        source: SourceId,
        diagnostic: Diagnostic,
    },
    CommandSkipped {
        worker: usize,
        kind: CommandKind,
        error: DispatchError,
    },
}

struct SourceItem {
    id: SourceId,
    text: String,
    /// Directory includes resolve against first; the working directory if unset.
    origin: Option<PathBuf>,
}

enum PrepareItem {
    Constant { constant: Constant },
    Instruction { source: SourceId, instruction: Instruction },
}

/// State shared by every stage worker.
struct Stages {
    decode_queue: LockFreeQueue<SourceItem>,
    prepare_queue: LockFreeQueue<PrepareItem>,
    dispatch_queue: LockFreeQueue<Command>,

    running: AtomicBool,
    decode_done: AtomicBool,
    prepare_done: AtomicBool,

    workers: Vec<WorkerStats>,
    finished_dispatch: AtomicUsize,
    sources_decoded: AtomicU64,
    sources_dropped: AtomicU64,
    commands_skipped: AtomicU64,

    options: CompileOptions,
    backend: Arc<dyn Backend>,
    events: Sender<PipelineEvent>,
}

impl Stages {
    fn emit(&self, event: PipelineEvent) {
        let _ = self.events.try_send(event);
    }

    /// Frees whatever is still queued once no worker can run. Returns how
    /// many items were discarded; only a pipeline joined without `start`
    /// leaves any behind.
    fn release_queues(&self) -> usize {
        fn drain<T>(queue: &LockFreeQueue<T>) -> usize {
            std::iter::from_fn(|| queue.pop()).count()
        }
        drain(&self.decode_queue) + drain(&self.prepare_queue) + drain(&self.dispatch_queue)
    }

    #[cfg(test)]
    fn queues_empty(&self) -> bool {
        self.decode_queue.is_empty() && self.prepare_queue.is_empty() && self.dispatch_queue.is_empty()
    }

    fn decode_loop(&self) {
        loop {
            let accepting = self.running.load(Ordering::Acquire);
            match self.decode_queue.pop() {
                Some(item) => self.decode(item),
                None if accepting => thread::yield_now(),
                None => break,
            }
        }
        self.decode_done.store(true, Ordering::Release);
        debug!("decode stage finished");
    }

    fn decode(&self, item: SourceItem) {
        let origin = item.origin.as_deref().unwrap_or(Path::new("."));
        let program = match load_program_at(&item.text, origin, &self.options) {
            Ok(program) => program,
            Err(err) => {
                self.sources_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(source = item.id, error = %err, "dropping shader source");
                self.emit(PipelineEvent::SourceDropped {
                    source: item.id,
                    reason: err.to_string(),
                });
                return;
            }
        };

        self.sources_decoded.fetch_add(1, Ordering::Relaxed);
        debug!(
            source = item.id,
            constants = program.constants.len(),
            instructions = program.instructions.len(),
            "decoded shader source"
        );
        for constant in program.constants {
            self.prepare_queue.push(PrepareItem::Constant { constant });
        }
        for instruction in program.instructions {
            self.prepare_queue.push(PrepareItem::Instruction {
                source: item.id,
                instruction,
            });
        }
    }

    fn prepare_loop(&self) {
        loop {
            let upstream_done = self.decode_done.load(Ordering::Acquire);
            match self.prepare_queue.pop() {
                Some(item) => self.prepare(item),
                None if !upstream_done => thread::yield_now(),
                None => break,
            }
        }
        self.prepare_done.store(true, Ordering::Release);
        debug!("prepare stage finished");
    }

    fn prepare(&self, item: PrepareItem) {
        match item {
            PrepareItem::Constant { constant } => {
                self.dispatch_queue.push(translate_constant(&constant));
            }
            PrepareItem::Instruction {
                source,
                instruction,
            } => {
                let mut commands = CommandList::new();
                if let Err(error) = translate_instruction(&instruction, &mut commands) {
                    debug!(source, line = instruction.line(), %error, "instruction degraded");
                    self.emit(PipelineEvent::TranslationDegraded {
                        source,
                        diagnostic: Diagnostic {
                            line: instruction.line(),
                            opcode: instruction.opcode().to_string(),
                            error,
                        },
                    });
                }
                for command in commands {
                    self.dispatch_queue.push(command);
                }
            }
        }
    }

    fn dispatch_loop(&self, worker: usize) {
        let stats = &self.workers[worker];
        stats.mark_started();
        loop {
            let upstream_done = self.prepare_done.load(Ordering::Acquire);
            match self.dispatch_queue.pop() {
                Some(command) => {
                    if let Err(error) = translator::dispatch(self.backend.as_ref(), &command) {
                        self.commands_skipped.fetch_add(1, Ordering::Relaxed);
                        debug!(worker, kind = %command.kind(), %error, "command skipped");
                        self.emit(PipelineEvent::CommandSkipped {
                            worker,
                            kind: command.kind(),
                            error,
                        });
                    }
                    stats.record();
                }
                None if !upstream_done => thread::yield_now(),
                None => break,
            }
        }
        self.finished_dispatch.fetch_add(1, Ordering::Release);
        debug!(worker, processed = stats.processed(), "dispatch worker finished");
    }

    fn summary(&self) -> PipelineSummary {
        let per_worker: Vec<u64> = self.workers.iter().map(WorkerStats::processed).collect();
        PipelineSummary {
            commands_processed: per_worker.iter().sum(),
            per_worker,
            sources_decoded: self.sources_decoded.load(Ordering::Relaxed),
            sources_dropped: self.sources_dropped.load(Ordering::Relaxed),
            commands_skipped: self.commands_skipped.load(Ordering::Relaxed),
        }
    }
}

/// Three-stage replay runtime: decode → prepare → dispatch.
///
/// One decode worker preprocesses, parses and validates each submitted source;
/// one prepare worker translates its constants and instructions in order; `n`
/// dispatch workers apply the resulting commands to the backend. Stages hand
/// work over through [`LockFreeQueue`]s and poll with `yield_now` when idle.
///
/// [`Pipeline::stop`] only closes the front door: every source already
/// submitted is still carried through all three stages before the workers
/// exit, so [`Pipeline::join`] accounts for all of them.
pub struct Pipeline {
    state: PipelineState,
    stages: Arc<Stages>,
    pool: Option<WorkerPool>,
    events: Receiver<PipelineEvent>,
    next_source: AtomicU64,
}

impl Pipeline {
    pub fn init(config: PipelineConfig, backend: Arc<dyn Backend>) -> Result<Self, PipelineError> {
        let width = config
            .dispatch_workers
            .clamp(MIN_DISPATCH_WORKERS, MAX_DISPATCH_WORKERS);
        if width != config.dispatch_workers {
            debug!(
                requested = config.dispatch_workers,
                width, "clamped dispatch worker count"
            );
        }

        let (events_tx, events_rx) = bounded(EVENT_CAPACITY);
        let mut options = CompileOptions::new();
        options.include_dir = config.include_dir;

        let stages = Arc::new(Stages {
            decode_queue: LockFreeQueue::new(),
            prepare_queue: LockFreeQueue::new(),
            dispatch_queue: LockFreeQueue::new(),
            running: AtomicBool::new(false),
            decode_done: AtomicBool::new(false),
            prepare_done: AtomicBool::new(false),
            workers: (0..width).map(|_| WorkerStats::default()).collect(),
            finished_dispatch: AtomicUsize::new(0),
            sources_decoded: AtomicU64::new(0),
            sources_dropped: AtomicU64::new(0),
            commands_skipped: AtomicU64::new(0),
            options,
            backend,
            events: events_tx,
        });

        let pool = WorkerPool::with_name("dx8-pipeline", width + STAGE_WORKERS)
            .map_err(PipelineError::Spawn)?;

        Ok(Self {
            state: PipelineState::Initialized,
            stages,
            pool: Some(pool),
            events: events_rx,
            next_source: AtomicU64::new(0),
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn dispatch_workers(&self) -> usize {
        self.stages.workers.len()
    }

    /// Launches the decode, prepare and dispatch workers.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        self.expect_state("start", &[PipelineState::Initialized])?;
        let pool = self.pool.as_ref().ok_or(PipelineError::InvalidState {
            operation: "start",
            state: self.state,
        })?;

        self.stages.running.store(true, Ordering::Release);

        let stages = self.stages.clone();
        pool.submit(move || stages.decode_loop());
        let stages = self.stages.clone();
        pool.submit(move || stages.prepare_loop());
        for worker in 0..self.stages.workers.len() {
            let stages = self.stages.clone();
            pool.submit(move || stages.dispatch_loop(worker));
        }

        self.state = PipelineState::Running;
        info!(dispatch_workers = self.stages.workers.len(), "pipeline started");
        Ok(())
    }

    /// Queues raw shader text for decoding; includes resolve against the
    /// working directory, then the configured include directory.
    pub fn submit(&self, source: impl Into<String>) -> Result<SourceId, PipelineError> {
        self.enqueue(source.into(), None)
    }

    /// Queues text read from a file in `origin_dir`.
    pub fn submit_from(
        &self,
        source: impl Into<String>,
        origin_dir: impl Into<PathBuf>,
    ) -> Result<SourceId, PipelineError> {
        self.enqueue(source.into(), Some(origin_dir.into()))
    }

    fn enqueue(&self, text: String, origin: Option<PathBuf>) -> Result<SourceId, PipelineError> {
        self.expect_state("submit to", &[PipelineState::Initialized, PipelineState::Running])?;
        let id = self.next_source.fetch_add(1, Ordering::Relaxed);
        self.stages.decode_queue.push(SourceItem { id, text, origin });
        Ok(id)
    }

    /// Stops accepting sources; queued work still drains.
    pub fn stop(&mut self) {
        if self.state == PipelineState::Running {
            self.stages.running.store(false, Ordering::Release);
            self.state = PipelineState::Stopping;
            debug!("pipeline stopping");
        }
    }

    /// Waits for every worker to finish, tears the pool down and releases
    /// anything left in the stage queues.
    pub fn join(&mut self) -> Result<PipelineSummary, PipelineError> {
        if self.state == PipelineState::Joined {
            return Err(PipelineError::InvalidState {
                operation: "join",
                state: self.state,
            });
        }
        self.stop();

        if let Some(pool) = self.pool.take() {
            pool.join();
            pool.shutdown();
        }
        let discarded = self.stages.release_queues();
        if discarded > 0 {
            warn!(discarded, "released unprocessed queue items");
        }
        self.state = PipelineState::Joined;

        let summary = self.stages.summary();
        info!(
            commands = summary.commands_processed,
            sources = summary.sources_decoded,
            dropped = summary.sources_dropped,
            skipped = summary.commands_skipped,
            "pipeline joined"
        );
        Ok(summary)
    }

    /// Sum over started dispatch workers of `processed / seconds running`.
    pub fn commands_per_second(&self) -> f64 {
        self.stages.workers.iter().filter_map(WorkerStats::rate).sum()
    }

    /// True once a stopped pipeline has pushed its last command through
    /// dispatch; [`Pipeline::join`] will then return without waiting.
    pub fn is_drained(&self) -> bool {
        self.state == PipelineState::Stopping
            && self.stages.finished_dispatch.load(Ordering::Acquire) == self.stages.workers.len()
    }

    pub fn commands_processed(&self) -> u64 {
        self.stages.workers.iter().map(WorkerStats::processed).sum()
    }

    /// Receiver for dropped-source, degraded-instruction and skipped-command
    /// events. Clones share one stream.
    pub fn events(&self) -> Receiver<PipelineEvent> {
        self.events.clone()
    }

    fn expect_state(&self, operation: &'static str, allowed: &[PipelineState]) -> Result<(), PipelineError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(PipelineError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.state != PipelineState::Joined {
            let _ = self.join();
        }
    }
}
