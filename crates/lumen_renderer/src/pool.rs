//! Fixed pool of persistent render worker threads.
//!
//! Workers pull boxed jobs from a shared queue. The pool offers a drain
//! barrier (`await_empty`) used between sampling passes, and a *sticky*
//! cancellation (`interrupt`): once set, every blocking operation observes
//! it, so an interrupt issued before anyone starts waiting is never missed.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use lumen_core::ConfigError;

use crate::error::RenderResult;
use crate::task::mix_seed;

/// Accumulated job time after which a throttled worker takes a break.
const SLEEP_INTERVAL: Duration = Duration::from_millis(75);

/// Per-worker information handed to every job.
#[derive(Debug, Clone, Copy)]
pub struct WorkerContext {
    /// Worker index, 0..threads
    pub id: usize,
    /// Seed derived from the pool seed and the worker id
    pub seed: u64,
}

type Job = Box<dyn FnOnce(&WorkerContext) + Send + 'static>;

struct PoolState {
    queue: VecDeque<Job>,
    /// Jobs currently executing
    active: usize,
    interrupted: bool,
    cpu_load: u32,
}

struct PoolShared {
    state: Mutex<PoolState>,
    /// Signalled when jobs are queued or the pool is interrupted
    work_available: Condvar,
    /// Signalled when the pool drains or is interrupted
    idle: Condvar,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A fixed set of render worker threads.
pub struct RenderWorkerPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
    seed: u64,
}

impl RenderWorkerPool {
    /// Spawn `threads` workers. Zero threads is a configuration error.
    pub fn new(threads: usize, seed: u64) -> RenderResult<Self> {
        if threads == 0 {
            return Err(ConfigError::ZeroThreads.into());
        }

        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                active: 0,
                interrupted: false,
                cpu_load: 100,
            }),
            work_available: Condvar::new(),
            idle: Condvar::new(),
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(threads),
            seed,
        };

        for id in 0..threads {
            let shared = Arc::clone(&pool.shared);
            let context = WorkerContext {
                id,
                seed: mix_seed(seed, id as u64),
            };
            // On spawn failure `pool` is dropped, which interrupts and joins
            // the workers started so far.
            let handle = thread::Builder::new()
                .name(format!("Render Worker {}", id))
                .spawn(move || worker_loop(&shared, context))?;
            pool.workers.push(handle);
        }

        log::debug!("Started render worker pool with {} threads", threads);
        Ok(pool)
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Queue a job. Returns false (and drops the job) if the pool was interrupted.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce(&WorkerContext) + Send + 'static,
    {
        let mut state = self.shared.lock();
        if state.interrupted {
            return false;
        }
        state.queue.push_back(Box::new(job));
        self.shared.work_available.notify_one();
        true
    }

    /// Block until the queue is empty and no job is executing, or until the
    /// pool is interrupted.
    pub fn await_empty(&self) {
        let mut state = self.shared.lock();
        while !state.interrupted && (!state.queue.is_empty() || state.active > 0) {
            state = self
                .shared
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Cancel the pool: discard queued jobs, wake every parked thread and
    /// turn later submissions into no-ops. Idempotent.
    pub fn interrupt(&self) {
        let discarded = {
            let mut state = self.shared.lock();
            state.interrupted = true;
            self.shared.work_available.notify_all();
            self.shared.idle.notify_all();
            std::mem::take(&mut state.queue)
        };
        // Jobs own channel senders and kernels; drop them outside the lock.
        if !discarded.is_empty() {
            log::debug!("Discarded {} queued render jobs", discarded.len());
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.shared.lock().interrupted
    }

    /// Set the target CPU utilization in percent (clamped to 1..=100).
    pub fn set_cpu_load(&self, percent: u32) {
        self.shared.lock().cpu_load = percent.clamp(1, 100);
        // Wake throttled workers so a raised limit applies immediately.
        self.shared.work_available.notify_all();
    }

    pub fn cpu_load(&self) -> u32 {
        self.shared.lock().cpu_load
    }
}

impl Drop for RenderWorkerPool {
    fn drop(&mut self) {
        self.interrupt();
        let current = thread::current().id();
        for handle in self.workers.drain(..) {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                log::error!("Render worker exited with a panic");
            }
        }
    }
}

fn worker_loop(shared: &PoolShared, context: WorkerContext) {
    let mut job_time = Duration::ZERO;

    loop {
        let job = {
            let mut state = shared.lock();
            loop {
                if state.interrupted {
                    return;
                }
                if let Some(job) = state.queue.pop_front() {
                    state.active += 1;
                    break job;
                }
                state = shared
                    .work_available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        let start = Instant::now();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| job(&context))) {
            log::error!(
                "Render worker {} job panicked: {}",
                context.id,
                panic_message(payload.as_ref())
            );
        }
        job_time += start.elapsed();

        let mut state = shared.lock();
        state.active -= 1;
        if state.active == 0 && state.queue.is_empty() {
            shared.idle.notify_all();
        }

        if job_time > SLEEP_INTERVAL {
            if state.cpu_load < 100 {
                // sleep = job_time * (1 - load) / load
                let load = state.cpu_load as f64;
                let pause = job_time.mul_f64((100.0 - load) / load);
                throttle(shared, state, pause);
            }
            job_time = Duration::ZERO;
        }
    }
}

/// Sleep for `pause`, waking early if the pool is interrupted or the load
/// limit is lifted.
fn throttle(shared: &PoolShared, mut state: MutexGuard<'_, PoolState>, pause: Duration) {
    let deadline = Instant::now() + pause;
    while !state.interrupted && state.cpu_load < 100 {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        state = shared
            .work_available
            .wait_timeout(state, deadline - now)
            .map(|(guard, _)| guard)
            .unwrap_or_else(|poisoned| poisoned.into_inner().0);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
