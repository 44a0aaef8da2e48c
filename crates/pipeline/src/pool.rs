use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

type Task = Box<dyn FnOnce() + Send + 'static>;

const DEFAULT_THREAD_NAME: &str = "dx8-worker";

#[derive(Default)]
struct PoolState {
    tasks: VecDeque<Task>,
    /// Workers currently running a task.
    active: usize,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<PoolState>,
    available: Condvar,
    idle: Condvar,
}

/// Fixed set of named worker threads draining one FIFO of closures.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> io::Result<Self> {
        Self::with_name(DEFAULT_THREAD_NAME, threads)
    }

    /// Spawns `threads` workers (at least one) named `<name>-<index>`.
    ///
    /// If any spawn fails, the workers already started are shut down and
    /// joined before the error is returned.
    pub fn with_name(name: &str, threads: usize) -> io::Result<Self> {
        let threads = threads.max(1);
        let mut pool = Self {
            shared: Arc::new(Shared::default()),
            workers: Vec::with_capacity(threads),
        };

        for index in 0..threads {
            let shared = pool.shared.clone();
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || worker_loop(&shared));
            match handle {
                Ok(handle) => pool.workers.push(handle),
                Err(err) => {
                    error!(%err, index, "failed to spawn worker thread");
                    pool.stop_workers();
                    return Err(err);
                }
            }
        }

        debug!(threads, name, "worker pool started");
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queues `task` for the next free worker.
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        state.tasks.push_back(Box::new(task));
        drop(state);
        self.shared.available.notify_one();
    }

    /// Blocks until every submitted task has finished.
    pub fn join(&self) {
        let mut state = self.shared.state.lock();
        while !state.tasks.is_empty() || state.active > 0 {
            self.shared.idle.wait(&mut state);
        }
    }

    /// Lets the workers drain the queue, then stops and joins them.
    pub fn shutdown(mut self) {
        self.stop_workers();
    }

    fn stop_workers(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
        }
        self.shared.available.notify_all();

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("worker thread panicked outside a task");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.stop_workers();
        }
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let task = {
            let mut state = shared.state.lock();
            loop {
                if let Some(task) = state.tasks.pop_front() {
                    state.active += 1;
                    break task;
                }
                if state.shutdown {
                    return;
                }
                shared.available.wait(&mut state);
            }
        };

        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            let name = thread::current().name().unwrap_or("worker").to_string();
            error!(thread = %name, "worker task panicked");
        }

        let mut state = shared.state.lock();
        state.active -= 1;
        if state.active == 0 && state.tasks.is_empty() {
            shared.idle.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn runs_every_submitted_task() {
        let pool = WorkerPool::new(4).unwrap();
        assert_eq!(pool.size(), 4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = counter.clone();
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
        pool.shutdown();
    }

    #[test]
    fn zero_threads_clamps_to_one() {
        let pool = WorkerPool::new(0).unwrap();
        assert_eq!(pool.size(), 1);
    }

    #[test]
    fn join_on_idle_pool_returns() {
        let pool = WorkerPool::new(2).unwrap();
        pool.join();
        pool.join();
    }

    #[test]
    fn shutdown_drains_pending_tasks() {
        let pool = WorkerPool::new(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            pool.submit(move || {
                thread::sleep(Duration::from_millis(2));
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn panicking_task_does_not_wedge_the_pool() {
        let pool = WorkerPool::new(1).unwrap();
        pool.submit(|| panic!("boom"));
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        pool.submit(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn workers_carry_the_pool_name() {
        let pool = WorkerPool::with_name("stage", 2).unwrap();
        let names = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..2 {
            let names = names.clone();
            pool.submit(move || {
                let name = thread::current().name().map(str::to_string);
                names.lock().push(name);
            });
        }
        pool.join();
        for name in names.lock().iter() {
            assert!(name.as_deref().is_some_and(|n| n.starts_with("stage-")));
        }
    }
}
